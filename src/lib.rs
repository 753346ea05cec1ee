//! sockterm - a WebSocket web terminal
//!
//! Serves a terminal-like page to browsers and multiplexes three traffic
//! classes over one WebSocket per visitor: server-issued DOM directives,
//! user-typed commands, and synchronous query/reply exchanges where a
//! command handler blocks until the browser answers (element existence,
//! attribute reads, free-text prompts).

pub mod command;
pub mod config;
pub mod directive;
pub mod flows;
pub mod origin;
pub mod protocol;
pub mod rendezvous;
pub mod server;
pub mod session;
pub mod tls;
pub mod users;
pub mod validate;
