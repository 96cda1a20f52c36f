//! Device access: addressing, command execution, connectivity.
//!
//! ```text
//! DeviceCommandRunner (CommandExecutor)
//!     └── ConnectionGuard  (get-state / connect / backoff)
//! classify()  → short message + remedy for any DeviceError
//! ```

mod classify;
mod errors;
mod guard;
mod runner;
pub mod tools;
mod types;

pub use classify::{classify, classify_text, Classification, ErrorKind};
pub use errors::{DeviceError, DeviceResult};
pub use guard::{ConnectionGuard, GuardTiming, DEFAULT_CONNECT_ATTEMPTS};
pub use runner::{CommandExecutor, DeviceCommandRunner};
pub use types::{ConnectionStatus, Device, DeviceAddress, DEFAULT_PORT};

pub(crate) use guard::pause;
pub(crate) use runner::{hide_console_window, prepend_path, wait_with_timeout};
