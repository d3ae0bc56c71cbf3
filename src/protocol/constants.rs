//! Chat protocol constants

/// Sender identity on every server-originated event
pub const SYSTEM_USER: &str = "System";

/// Private notice for a name held by another viewer
pub const NAME_TAKEN_NOTICE: &str = "Username already taken";

/// Private notice for a name that is blank after trimming
pub const EMPTY_NAME_NOTICE: &str = "Username cannot be empty";

/// Content carried by every presence event
pub const USER_LIST_NOTICE: &str = "Active users updated";

/// Default relay port
pub const DEFAULT_PORT: u16 = 3001;

/// Default per-connection outbound queue depth
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 64;

/// Default maximum inbound frame size (64KB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;
