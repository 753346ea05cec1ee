//! Built-in commands: help, clear, login, register.
//!
//! login and register are interactive flows: they chain synchronous queries
//! (prompts) into short dialogues. Validation and auth failures never
//! escape as errors; they are reported to the user as messages and the
//! session returns to idle. Only codec/transport failures propagate.

use crate::command::{CommandRegistry, HandlerFuture};
use crate::directive::{INPUT, OUTPUT};
use crate::session::Session;
use crate::users::UserIdentity;
use crate::validate;

/// Build the process-wide command table. Called once at startup.
pub fn builtin_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(
        "help",
        "help returns help information about available commands.",
        help,
    );
    registry.register("clear", "clear the current terminal's content", clear);
    registry.register(
        "login",
        "login lets you log into a registered user account.",
        login,
    );
    registry.register("register", "register a user account", register);
    registry
}

fn help<'a>(session: &'a Session, args: &'a [String]) -> HandlerFuture<'a> {
    Box::pin(async move {
        if args.len() == 1 {
            let names: Vec<&str> = session.registry().names().collect();
            session
                .append_msg(OUTPUT, &format!("Available commands: {}", names.join(" ")))
                .await
        } else if let Some(command) = session.registry().get(&args[1]) {
            session.append_msg(OUTPUT, command.description).await
        } else {
            session
                .append_msg(OUTPUT, &format!("Command not available: {}", args[1]))
                .await
        }
    })
}

fn clear<'a>(session: &'a Session, _args: &'a [String]) -> HandlerFuture<'a> {
    Box::pin(async move { session.set_html(OUTPUT, " ").await })
}

fn login<'a>(session: &'a Session, args: &'a [String]) -> HandlerFuture<'a> {
    Box::pin(async move {
        if args.len() < 2 {
            return session.append_msg(OUTPUT, "Usage: login <name>").await;
        }
        let name = &args[1];
        if !validate::is_valid_name(name) {
            return session.append_msg(OUTPUT, "Invalid characters in name").await;
        }
        // No password prompt for unknown names. The existence check leaks
        // less than it seems: `register` reveals taken names anyway.
        if !session.users().exists(name) {
            return session.append_msg(OUTPUT, "User does not exist").await;
        }

        let password = session
            .prompt_secure(INPUT, "Please enter your password")
            .await?;
        if password.is_empty() {
            return Ok(());
        }

        match session.users().load(name, &password) {
            Ok(user) => {
                let welcome = format!("Welcome back, {}", user.name);
                session.set_identity(user);
                session.append_msg(OUTPUT, &welcome).await
            }
            // Deliberately generic: never reveal which factor was wrong.
            Err(_) => session.append_msg(OUTPUT, "Login failed").await,
        }
    })
}

fn register<'a>(session: &'a Session, args: &'a [String]) -> HandlerFuture<'a> {
    Box::pin(async move {
        if args.len() < 2 {
            return session.append_msg(OUTPUT, "Usage: register <name>").await;
        }
        let name = &args[1];
        if !validate::is_valid_name(name) {
            return session.append_msg(OUTPUT, "Invalid characters in name").await;
        }

        let email = session.prompt("Enter your email address").await?;
        if !validate::is_valid_email(&email) {
            return session.append_msg(OUTPUT, "Bad email address").await;
        }

        let first = session.prompt_secure(INPUT, "Enter a good password").await?;
        let second = session
            .prompt_secure(INPUT, "Re-enter your password")
            .await?;
        if first != second {
            return session
                .append_msg(OUTPUT, "Failed! Passwords did not match")
                .await;
        }

        let user = UserIdentity {
            name: name.clone(),
            email,
        };
        match session.users().save(&user, &first) {
            Ok(()) => {
                session.set_identity(user);
                session
                    .append_msg(OUTPUT, "User account created (don't forget your password!)")
                    .await
            }
            Err(e) => session.append_msg(OUTPUT, &e.to_string()).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Packet;
    use crate::session::SessionError;
    use crate::users::{MemoryStore, UserStore};
    use futures::stream;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        session: Arc<Session>,
        outbound: mpsc::Receiver<String>,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let (tx, outbound) = mpsc::channel(64);
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(Session::new(
            "127.0.0.1:4000".parse().unwrap(),
            tx,
            Arc::new(builtin_registry()),
            store.clone(),
            Duration::from_secs(5),
        ));
        Harness {
            session,
            outbound,
            store,
        }
    }

    fn cmd(args: &[&str]) -> Result<String, SessionError> {
        Ok(Packet::command(args.iter().copied()).encode().unwrap())
    }

    fn reply(text: &str) -> Result<String, SessionError> {
        Ok(text.to_string())
    }

    /// Run the session over scripted inbound frames and return the decoded
    /// outbound packets.
    async fn run_script(frames: Vec<Result<String, SessionError>>) -> (Harness, Vec<Packet>) {
        let mut h = harness();
        h.session.run(stream::iter(frames)).await.unwrap();
        let mut sent = Vec::new();
        while let Ok(frame) = h.outbound.try_recv() {
            sent.push(Packet::decode(&frame).unwrap());
        }
        (h, sent)
    }

    fn texts(sent: &[Packet]) -> Vec<&str> {
        sent.iter()
            .filter(|p| p.kind == "appendElement")
            .filter_map(|p| p.map.get("Text").map(String::as_str))
            .collect()
    }

    #[tokio::test]
    async fn help_lists_commands_sorted() {
        let (_h, sent) = run_script(vec![cmd(&["help"])]).await;
        assert_eq!(
            texts(&sent),
            vec!["Available commands: clear help login register"]
        );
    }

    #[tokio::test]
    async fn help_for_known_and_unknown_commands() {
        let (_h, sent) = run_script(vec![cmd(&["help", "clear"]), cmd(&["help", "dance"])]).await;
        assert_eq!(
            texts(&sent),
            vec![
                "clear the current terminal's content",
                "Command not available: dance"
            ]
        );
    }

    #[tokio::test]
    async fn clear_resets_output_region() {
        let (_h, sent) = run_script(vec![cmd(&["clear"])]).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "innerHTML");
        assert_eq!(sent[0].map["Selector"], OUTPUT);
        assert_eq!(sent[0].map["Value"], " ");
    }

    #[tokio::test]
    async fn login_without_name_prints_usage() {
        let (_h, sent) = run_script(vec![cmd(&["login"])]).await;
        assert_eq!(texts(&sent), vec!["Usage: login <name>"]);
    }

    #[tokio::test]
    async fn login_invalid_name_is_rejected() {
        let (_h, sent) = run_script(vec![cmd(&["login", "bad name!"])]).await;
        assert_eq!(texts(&sent), vec!["Invalid characters in name"]);
    }

    #[tokio::test]
    async fn login_unknown_user_gets_no_password_prompt() {
        let (h, sent) = run_script(vec![cmd(&["login", "ghost"])]).await;
        assert_eq!(texts(&sent), vec!["User does not exist"]);
        // No getAttribute/setAttribute means no masked prompt was started.
        assert!(sent.iter().all(|p| !p.kind.contains("Attribute")));
        assert!(h.session.identity().is_none());
    }

    #[tokio::test]
    async fn login_wrong_password_fails_generically() {
        let mut h = harness();
        h.store.insert("alice", "a@x.com", "right-pass");

        // getAttribute("type") reply, then the password line.
        let frames = vec![cmd(&["login", "alice"]), reply("text"), reply("wrong-pass")];
        h.session.run(stream::iter(frames)).await.unwrap();

        let mut sent = Vec::new();
        while let Ok(frame) = h.outbound.try_recv() {
            sent.push(Packet::decode(&frame).unwrap());
        }
        assert_eq!(
            texts(&sent),
            vec!["Please enter your password", "Login failed"]
        );
        assert!(h.session.identity().is_none());
    }

    #[tokio::test]
    async fn login_success_sets_identity() {
        let mut h = harness();
        h.store.insert("alice", "a@x.com", "hunter2");

        let frames = vec![cmd(&["login", "alice"]), reply("text"), reply("hunter2")];
        h.session.run(stream::iter(frames)).await.unwrap();

        let mut sent = Vec::new();
        while let Ok(frame) = h.outbound.try_recv() {
            sent.push(Packet::decode(&frame).unwrap());
        }
        assert_eq!(
            texts(&sent),
            vec!["Please enter your password", "Welcome back, alice"]
        );
        assert_eq!(h.session.identity().unwrap().name, "alice");
    }

    #[tokio::test]
    async fn masked_prompt_restores_input_type() {
        let mut h = harness();
        h.store.insert("alice", "a@x.com", "hunter2");

        let frames = vec![cmd(&["login", "alice"]), reply("text"), reply("hunter2")];
        h.session.run(stream::iter(frames)).await.unwrap();

        let mut attr_ops = Vec::new();
        while let Ok(frame) = h.outbound.try_recv() {
            let p = Packet::decode(&frame).unwrap();
            if p.kind == "setAttribute" {
                attr_ops.push(p.map["Value"].clone());
            }
        }
        // Masked for the prompt, then restored to the prior value.
        assert_eq!(attr_ops, vec!["password", "text"]);
    }

    #[tokio::test]
    async fn register_mismatched_passwords_never_persist() {
        let (h, sent) = run_script(vec![
            cmd(&["register", "bob"]),
            reply("b@x.com"),
            reply("type-a"), // getAttribute reply for first masked prompt
            reply("p1"),
            reply("type-a"), // getAttribute reply for second masked prompt
            reply("p2"),
        ])
        .await;
        assert!(texts(&sent).contains(&"Failed! Passwords did not match"));
        assert!(!h.store.exists("bob"));
        assert!(h.session.identity().is_none());
    }

    #[tokio::test]
    async fn register_bad_email_aborts_before_password() {
        let (h, sent) = run_script(vec![cmd(&["register", "bob"]), reply("not-an-email")]).await;
        assert_eq!(
            texts(&sent),
            vec!["Enter your email address", "Bad email address"]
        );
        assert!(!h.store.exists("bob"));
    }

    #[tokio::test]
    async fn register_success_persists_and_confirms() {
        let (h, sent) = run_script(vec![
            cmd(&["register", "bob"]),
            reply("b@x.com"),
            reply("text"),
            reply("p1"),
            reply("text"),
            reply("p1"),
        ])
        .await;
        assert!(texts(&sent).contains(&"User account created (don't forget your password!)"));
        assert!(h.store.exists("bob"));
        let loaded = h.store.load("bob", "p1").unwrap();
        assert_eq!(loaded.email, "b@x.com");
        assert_eq!(h.session.identity().unwrap().name, "bob");
    }

    #[tokio::test]
    async fn register_duplicate_name_reports_store_error() {
        let mut h = harness();
        h.store.insert("bob", "old@x.com", "old");

        let frames = vec![
            cmd(&["register", "bob"]),
            reply("b@x.com"),
            reply("text"),
            reply("p1"),
            reply("text"),
            reply("p1"),
        ];
        h.session.run(stream::iter(frames)).await.unwrap();

        let mut sent = Vec::new();
        while let Ok(frame) = h.outbound.try_recv() {
            sent.push(Packet::decode(&frame).unwrap());
        }
        assert!(texts(&sent).contains(&"account already exists"));
        // The original credentials survive.
        assert!(h.store.load("bob", "old").is_ok());
    }

    #[tokio::test]
    async fn register_without_name_prints_usage() {
        let (_h, sent) = run_script(vec![cmd(&["register"])]).await;
        assert_eq!(texts(&sent), vec!["Usage: register <name>"]);
    }
}
