//! Live stream chat relay
//!
//! A WebSocket server that gives every viewer of a live stream a shared chat
//! channel. Viewers claim a display name that is unique among those present,
//! then chat; joins, leaves and the current viewer list are broadcast to
//! everyone.
//!
//! # Example
//!
//! ```no_run
//! use live_chat_relay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> live_chat_relay::Result<()> {
//! let server = RelayServer::new(ServerConfig::default());
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use protocol::{ClientRequest, ServerEvent};
pub use registry::{ConnectionHandle, ConnectionRegistry, RegistryError};
pub use server::{RelayServer, ServerConfig};
