//! Chat relay server
//!
//! - `listener`: axum router, connection limit and serve loop
//! - `connection`: one task per viewer socket plus its writer task
//! - `relay`: the transition table and broadcast sequencing

pub mod config;
pub mod connection;
pub mod listener;
pub mod relay;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::RelayServer;
pub use relay::{DispatchOutcome, Relay};
