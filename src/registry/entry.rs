//! Connection handle types
//!
//! This module defines the per-connection send handle stored in the registry.

use std::net::SocketAddr;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::error::DeliveryError;

/// Serialized outbound frame, cheap to clone per recipient
pub type OutboundFrame = Utf8Bytes;

/// Sending half of a connection's outbound queue
///
/// The receiving half is drained by the connection's writer task. Cloning a
/// handle does not open a new queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Unique session ID assigned on accept
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    tx: mpsc::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer task drains
    pub fn channel(
        session_id: u64,
        peer_addr: SocketAddr,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                session_id,
                peer_addr,
                tx,
            },
            rx,
        )
    }

    /// Queue a frame without waiting
    ///
    /// A full queue means the peer is not keeping up; the frame is dropped for
    /// this recipient only.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Whether the writer task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
