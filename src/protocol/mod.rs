//! Chat wire protocol
//!
//! JSON text frames in both directions, tagged by a `type` field.
//!
//! - `message`: inbound requests (`setUsername`, `message`)
//! - `event`: outbound events (`message`, `system`, `userList`)

pub mod constants;
pub mod event;
pub mod message;

pub use event::ServerEvent;
pub use message::{ClientRequest, FrameError};
