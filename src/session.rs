//! Per-connection session state and the read-dispatch loop.
//!
//! A `Session` owns one WebSocket for its whole life. Its read loop pulls
//! inbound frames and routes each one to whichever consumer currently
//! expects it: the command dispatcher by default, or the rendezvous slot
//! when a handler is awaiting a query reply. Handlers run to completion
//! before the next command is dispatched, so at most one query is ever
//! outstanding per session and the reply to a query is unambiguously the
//! next inbound frame.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::command::CommandRegistry;
use crate::directive;
use crate::protocol::{Packet, ProtocolError};
use crate::rendezvous::{QueryError, Rendezvous};
use crate::users::{UserIdentity, UserStore};

/// Default bound on how long a query waits for the browser to answer.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced by session operations and the read loop.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed inbound frame. Fatal: the read loop terminates.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The peer is gone or the outbound path is down. Fatal.
    #[error("connection closed")]
    ConnectionClosed,
    /// Transport-level read failure. Fatal.
    #[error("transport error: {0}")]
    Transport(String),
    /// A query wait failed. Timeout is recoverable (the handler aborts,
    /// the session lives on); a closed wait is fatal.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// A queried element does not exist. Recoverable.
    #[error("no element matches selector {0}")]
    ElementMissing(String),
}

impl SessionError {
    /// Whether this error must terminate the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Protocol(_)
            | SessionError::ConnectionClosed
            | SessionError::Transport(_) => true,
            SessionError::Query(QueryError::Closed) => true,
            SessionError::Query(_) | SessionError::ElementMissing(_) => false,
        }
    }
}

/// State for one duplex connection.
///
/// Created on accept (after the origin check), destroyed when the read
/// loop terminates. Reconnecting browsers get a fresh session with no
/// memory of the old one.
pub struct Session {
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<String>,
    rendezvous: Rendezvous,
    user: Mutex<Option<UserIdentity>>,
    registry: Arc<CommandRegistry>,
    users: Arc<dyn UserStore>,
    query_timeout: Duration,
}

impl Session {
    pub fn new(
        remote_addr: SocketAddr,
        outbound: mpsc::Sender<String>,
        registry: Arc<CommandRegistry>,
        users: Arc<dyn UserStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            remote_addr,
            outbound,
            rendezvous: Rendezvous::new(),
            user: Mutex::new(None),
            registry,
            users,
            query_timeout,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn users(&self) -> &dyn UserStore {
        &*self.users
    }

    /// The authenticated identity, if a login/register flow has completed.
    pub fn identity(&self) -> Option<UserIdentity> {
        self.user.lock().clone()
    }

    /// Replace the authenticated identity. A later login overwrites an
    /// earlier one.
    pub fn set_identity(&self, user: UserIdentity) {
        *self.user.lock() = Some(user);
    }

    // ── Outbound path ──────────────────────────────────────────────

    /// Fire-and-forget: encode and queue a directive for transmission.
    pub async fn send(&self, packet: &Packet) -> Result<(), SessionError> {
        let frame = packet.encode()?;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| SessionError::ConnectionClosed)
    }

    /// Send a query directive, then suspend until the browser's reply
    /// arrives through the rendezvous slot (or the wait expires).
    pub async fn query(&self, packet: &Packet) -> Result<String, SessionError> {
        self.send(packet).await?;
        Ok(self.rendezvous.recv(self.query_timeout).await?)
    }

    // ── DOM directive operations ───────────────────────────────────

    /// Append a styled message line.
    pub async fn append_msg(&self, selector: &str, text: &str) -> Result<(), SessionError> {
        self.send(&directive::append_message(selector, text)).await
    }

    /// Append a hyperlink.
    pub async fn append_link(
        &self,
        selector: &str,
        href: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        self.send(&directive::append_link(selector, href, text)).await
    }

    /// Append a line break.
    pub async fn append_break(&self, selector: &str) -> Result<(), SessionError> {
        self.send(&directive::append_break(selector)).await
    }

    /// Move input focus.
    pub async fn focus(&self, selector: &str, value: &str) -> Result<(), SessionError> {
        self.send(&directive::focus(selector, value)).await
    }

    /// Query whether an element exists.
    pub async fn exists(&self, selector: &str) -> Result<bool, SessionError> {
        let reply = self.query(&directive::exists(selector)).await?;
        Ok(reply == "true")
    }

    /// Replace an element's HTML content.
    pub async fn set_html(&self, selector: &str, value: &str) -> Result<(), SessionError> {
        self.send(&directive::set_html(selector, value)).await
    }

    /// Query an element's HTML content.
    pub async fn get_html(&self, selector: &str) -> Result<String, SessionError> {
        if !self.exists(selector).await? {
            return Err(SessionError::ElementMissing(selector.to_string()));
        }
        self.query(&directive::get_html(selector)).await
    }

    /// Set a DOM attribute.
    pub async fn set_attribute(
        &self,
        selector: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), SessionError> {
        self.send(&directive::set_attribute(selector, attribute, value))
            .await
    }

    /// Query a DOM attribute.
    pub async fn get_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<String, SessionError> {
        self.query(&directive::get_attribute(selector, attribute)).await
    }

    /// Set a CSS property.
    pub async fn set_property(
        &self,
        selector: &str,
        property: &str,
        value: &str,
    ) -> Result<(), SessionError> {
        self.send(&directive::set_property(selector, property, value))
            .await
    }

    /// Query a computed CSS property.
    pub async fn get_property(
        &self,
        selector: &str,
        property: &str,
    ) -> Result<String, SessionError> {
        self.query(&directive::get_property(selector, property)).await
    }

    /// Toggle an element's contenteditable state.
    pub async fn editable(&self, selector: &str, value: &str) -> Result<(), SessionError> {
        self.send(&directive::editable(selector, value)).await
    }

    /// Print `text` as a message, then wait for the user's next input line.
    pub async fn prompt(&self, text: &str) -> Result<String, SessionError> {
        let text = if text.is_empty() { "Enter some input:" } else { text };
        self.append_msg(directive::OUTPUT, text).await?;
        Ok(self.rendezvous.recv(self.query_timeout).await?)
    }

    /// Masked prompt: flip the input element to a password field for the
    /// duration of the prompt, restoring the prior attribute value
    /// afterwards whether or not the prompt succeeded.
    pub async fn prompt_secure(&self, selector: &str, text: &str) -> Result<String, SessionError> {
        let prior = self.get_attribute(selector, "type").await?;
        self.set_attribute(selector, "type", "password").await?;
        let result = self.prompt(text).await;
        let restore = self.set_attribute(selector, "type", &prior).await;
        let value = result?;
        restore?;
        Ok(value)
    }

    // ── Read-dispatch loop ─────────────────────────────────────────

    /// Run the session to completion over a stream of inbound text frames.
    ///
    /// Returns `Ok(())` on clean peer close, or the fatal error that ended
    /// the session. Any suspended query is woken with
    /// [`QueryError::Closed`] on the way out.
    pub async fn run<S>(&self, inbound: S) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<String, SessionError>>,
    {
        let inbound = std::pin::pin!(inbound);
        let result = self.drive(inbound).await;
        self.rendezvous.close();
        result
    }

    async fn drive<S>(&self, mut inbound: S) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<String, SessionError>> + Unpin,
    {
        loop {
            // A frame nobody claimed during the previous dispatch is the
            // next command.
            let frame = match self.rendezvous.take_buffered() {
                Some(frame) => frame,
                None => match inbound.next().await {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            };

            // No query can be pending here (no handler is running), so
            // this frame must be a structured command packet.
            let packet = Packet::decode(&frame)?;
            let Some(name) = packet.command_name().map(str::to_owned) else {
                return Err(ProtocolError::EmptyCommand.into());
            };

            // Dispatch the handler while continuing to pump the transport:
            // frames arriving mid-handler feed the rendezvous slot instead
            // of being dispatched.
            let mut teardown: Option<SessionError> = None;
            let outcome = {
                let fut = self.registry.dispatch(self, &packet.args);
                let mut fut = std::pin::pin!(fut);
                loop {
                    tokio::select! {
                        result = &mut fut => break result,
                        msg = inbound.next(), if teardown.is_none() => match msg {
                            Some(Ok(frame)) => {
                                // Claimed by the pending query, or buffered
                                // in arrival order for later.
                                let _ = self.rendezvous.deliver(frame);
                            }
                            Some(Err(e)) => {
                                teardown = Some(e);
                                self.rendezvous.close();
                            }
                            None => {
                                teardown = Some(SessionError::ConnectionClosed);
                                self.rendezvous.close();
                            }
                        },
                    }
                }
            };

            if let Some(teardown) = teardown {
                // The transport died mid-handler. Whatever error the handler
                // returned (typically a Closed query wait) is a consequence
                // of the teardown, not a fault of its own.
                if let Err(e) = outcome {
                    tracing::debug!(command = %name, error = %e, "handler ended by teardown");
                }
                return match teardown {
                    SessionError::ConnectionClosed => Ok(()),
                    other => Err(other),
                };
            }

            if let Err(e) = outcome {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::warn!(
                    addr = %self.remote_addr,
                    command = %name,
                    error = %e,
                    "command failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote_addr", &self.remote_addr)
            .field("user", &*self.user.lock())
            .finish_non_exhaustive()
    }
}
