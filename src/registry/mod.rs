//! Connection registry for presence and fan-out
//!
//! The registry maps claimed display names to connection handles and is the
//! single source of truth for who is present. Broadcasts walk a point-in-time
//! copy of the handles and push one shared, pre-serialized frame into each
//! recipient's bounded send queue.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ConnectionRegistry>
//!                   ┌───────────────────────────────┐
//!                   │ entries: IndexMap<name,       │
//!                   │   ConnectionHandle {          │
//!                   │     tx: mpsc::Sender<Frame>,  │
//!                   │   }                           │
//!                   │ >                             │
//!                   └───────────────┬───────────────┘
//!                                   │
//!         ┌─────────────────────────┼─────────────────────────┐
//!         │                         │                         │
//!         ▼                         ▼                         ▼
//!    [Connection]              [Connection]              [Connection]
//!    dispatch()                writer task               writer task
//!         │                         │                         │
//!         └──► registry.broadcast()─┴──► try_send() ──► WebSocket
//! ```
//!
//! # Shared Frames
//!
//! `OutboundFrame` is reference counted, so every recipient of a broadcast
//! shares the same JSON allocation.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{ConnectionHandle, OutboundFrame};
pub use error::{DeliveryError, RegistryError};
pub use store::{BroadcastOutcome, ConnectionRegistry};
