//! JSON wire protocol between server and browser.
//!
//! Every frame is UTF-8 text. Server→client frames are encoded [`Packet`]s
//! carrying a directive (`Type` + `Map`). Client→server frames are either
//! encoded [`Packet`]s carrying a command (`Args`, with `Args[0]` the command
//! name) or bare replies: a raw scalar string answering an outstanding query,
//! not wrapped in the packet envelope at all. Replies are matched to queries
//! purely by ordering (see [`crate::rendezvous`]), so they never pass through
//! [`Packet::decode`].
//!
//! Field and map-key casing is PascalCase for compatibility with the client
//! script (`Type`, `Args`, `Map`, `Selector`, ...).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum accepted frame size (64 KiB). Prevents OOM on malformed data.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// The wire envelope for directives and commands.
///
/// A packet is either a *directive* (`kind` set, `map` populated, `args`
/// empty) sent server→client, or a *command* (`args` populated, `args[0]`
/// the command name) sent client→server. Absent fields decode to their
/// empty form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Packet {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Args")]
    pub args: Vec<String>,
    #[serde(rename = "Map")]
    pub map: HashMap<String, String>,
}

impl Packet {
    /// Create an empty directive packet with the given type discriminator.
    pub fn directive(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Create a command packet. `args[0]` is the command name.
    pub fn command<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add a key/value pair to the directive map (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.map.insert(key.into(), value.into());
        self
    }

    /// The command name, if this packet carries one.
    pub fn command_name(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Encode this packet as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a text frame into a packet.
    ///
    /// Only used for frames expected to be structured; bare query replies
    /// are consumed as raw text by the query side and never reach here.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(text.len()));
        }
        Ok(serde_json::from_str(text)?)
    }
}

/// Protocol-level failures. All of these are fatal to the session:
/// a corrupt frame ends the read loop, it is not retried or skipped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {0} bytes (max {MAX_FRAME_LEN})")]
    FrameTooLarge(usize),
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("non-text frame on a text protocol")]
    NonTextFrame,
    #[error("packet carries no command")]
    EmptyCommand,
}
