//! Inbound chat requests
//!
//! Clients send JSON objects tagged by `type`:
//!
//! ```text
//! {"type":"setUsername","username":"alice"}
//! {"type":"message","content":"hello"}
//! ```
//!
//! Anything else (unknown tag, missing field, non-JSON text, binary frames)
//! is a malformed frame. Malformed frames are discarded by the caller and
//! never close the connection.

use serde::Deserialize;

/// Request parsed from a client text frame
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientRequest {
    /// Claim a display name
    SetUsername {
        /// Requested name, untrimmed as sent
        username: String,
    },
    /// Send a chat line
    Message {
        /// Chat text, relayed verbatim
        content: String,
    },
}

/// Reason a frame was discarded
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Text frame is not a recognized request
    #[error("invalid request: {0}")]
    Invalid(#[from] serde_json::Error),

    /// Binary frames are not part of the protocol
    #[error("binary frame of {0} bytes")]
    Binary(usize),
}

impl ClientRequest {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::SetUsername { .. } => "setUsername",
            ClientRequest::Message { .. } => "message",
        }
    }
}

/// Normalize a requested display name
///
/// Leading and trailing whitespace, including a stray byte-order mark, is not
/// part of the identity. Returns `None` when nothing is left.
pub fn normalize_username(raw: &str) -> Option<&str> {
    let name = raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
