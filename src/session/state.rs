//! Session state machine
//!
//! Tracks a viewer connection from accept to close.
//!
//! ```text
//! Connecting ──setUsername(ok)──► Identified
//!     │                               │
//!     └──────── transport close ──────┴──► Closed
//! ```

use std::net::SocketAddr;
use std::time::Instant;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport open, no display name yet
    Connecting,
    /// Display name claimed in the registry
    Identified,
    /// Transport gone
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time the display name was claimed
    pub identified_at: Option<Instant>,

    /// Frames received from the client
    pub frames_received: u64,

    /// Frames discarded as malformed
    pub frames_discarded: u64,

    username: Option<String>,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connecting,
            connected_at: Instant::now(),
            identified_at: None,
            frames_received: 0,
            frames_discarded: 0,
            username: None,
        }
    }

    /// Record a successful name claim
    ///
    /// Only valid from `Connecting`; returns false otherwise and leaves the
    /// session unchanged.
    pub fn identify(&mut self, name: impl Into<String>) -> bool {
        if self.phase != SessionPhase::Connecting {
            return false;
        }

        self.username = Some(name.into());
        self.identified_at = Some(Instant::now());
        self.phase = SessionPhase::Identified;
        true
    }

    /// Move to `Closed`
    ///
    /// Returns the name that must be released, if the session was identified.
    /// Closing twice returns `None` the second time.
    pub fn close(&mut self) -> Option<String> {
        let released = match self.phase {
            SessionPhase::Identified => self.username.take(),
            _ => None,
        };
        self.phase = SessionPhase::Closed;
        released
    }

    /// Claimed display name
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Check if session has a claimed name
    pub fn is_identified(&self) -> bool {
        self.phase == SessionPhase::Identified
    }

    /// Check if session is closed
    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
