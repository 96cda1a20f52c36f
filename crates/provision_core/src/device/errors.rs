//! Error types for device-tool interaction.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single device-tool invocation or connectivity check.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The tool exited non-zero and wrote diagnostics to stderr.
    #[error("{command} failed with exit code {exit_code}: {stderr}")]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The tool did not finish within its allotted time.
    #[error("{command} timeout after {}s", timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    /// The device stayed unreachable after all reconnect attempts.
    #[error("device offline: {address} unreachable after {attempts} attempts")]
    Connectivity { address: String, attempts: u32 },

    /// The tool could not be started at all.
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// Text that does not parse as `ip[:port]`.
    #[error("invalid device address '{0}'")]
    InvalidAddress(String),
}

impl DeviceError {
    pub fn command(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout,
        }
    }

    pub fn connectivity(address: impl Into<String>, attempts: u32) -> Self {
        Self::Connectivity {
            address: address.into(),
            attempts,
        }
    }

    pub fn launch(tool: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            tool: tool.into(),
            source,
        }
    }

    pub fn invalid_address(text: impl Into<String>) -> Self {
        Self::InvalidAddress(text.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
