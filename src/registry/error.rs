//! Registry error types
//!
//! Error types for connection registry operations and per-recipient delivery.

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Display name is held by another present connection
    #[error("Username already taken: {0}")]
    NameTaken(String),
}

/// Why a frame could not be queued for one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Recipient's send queue is at capacity (slow peer)
    #[error("send queue full")]
    QueueFull,
    /// Recipient's writer task has exited
    #[error("connection closed")]
    Closed,
}
