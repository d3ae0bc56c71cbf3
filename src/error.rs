//! Error types
//!
//! Crate-level error and result alias. Per-connection failures never surface
//! here; they are logged and absorbed by the relay.

/// Error type for server operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket bind, accept or serve failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
