//! Command registry and dispatcher.
//!
//! A process-wide table mapping command names to handlers, built once at
//! startup and injected into each session (sessions never read ambient
//! global state, which keeps them testable in isolation). The table is
//! read-only after startup and safe for concurrent reads; a `BTreeMap`
//! keeps `help` output deterministically sorted.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::directive;
use crate::protocol::ProtocolError;
use crate::session::{Session, SessionError};

/// The future a command handler returns.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;

/// A command handler: pure function of session + argument list.
/// `args[0]` is always the command's own name.
pub type Handler = for<'a> fn(&'a Session, &'a [String]) -> HandlerFuture<'a>;

/// Static descriptor for one registered command.
pub struct Command {
    pub name: &'static str,
    pub description: &'static str,
    pub handler: Handler,
}

/// The startup-populated command table.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Startup-time only; there is no removal.
    pub fn register(&mut self, name: &'static str, description: &'static str, handler: Handler) {
        self.commands.insert(
            name,
            Command {
                name,
                description,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Registered command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Resolve `args[0]` and invoke the handler. An unknown command is
    /// user-facing feedback, not an error: the session stays alive.
    pub async fn dispatch(&self, session: &Session, args: &[String]) -> Result<(), SessionError> {
        let Some(name) = args.first() else {
            return Err(ProtocolError::EmptyCommand.into());
        };
        match self.get(name) {
            Some(command) => {
                tracing::debug!(command = %command.name, "dispatching");
                (command.handler)(session, args).await
            }
            None => {
                session
                    .append_msg(directive::OUTPUT, &format!("{name}: command not found"))
                    .await
            }
        }
    }
}
