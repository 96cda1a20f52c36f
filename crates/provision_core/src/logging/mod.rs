//! Logging for the provisioner.
//!
//! - [`RunLogger`]: per-run log (file + callback) with a device-tool output tail
//! - [`init_tracing`] / [`init_tracing_with_file`]: process-wide `tracing` setup
//!
//! ```no_run
//! use provision_core::logging::{LogConfig, RunLogger};
//!
//! let logger = RunLogger::new("install_20260101_120000", ".logs", LogConfig::default(), None)
//!     .unwrap();
//! logger.phase("10.0.0.5:5555");
//! logger.step(1, 10, "Acquire root");
//! logger.command("adb -s 10.0.0.5:5555 root");
//! logger.success("Device provisioned");
//! ```

mod run_logger;
mod types;

use std::path::Path;

pub use run_logger::RunLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

pub(crate) use run_logger::sanitize_filename;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter_for(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()))
}

/// Global stderr subscriber. `RUST_LOG` overrides `default_level`.
///
/// Call once at startup.
pub fn init_tracing(default_level: LogLevel) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter_for(default_level))
        .init();
}

/// Like [`init_tracing`], plus a non-blocking daily file `<file_name>.<date>` in `log_dir`.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init_tracing_with_file(
    default_level: LogLevel,
    log_dir: &Path,
    file_name: &str,
) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter_for(default_level))
        .init();

    Ok(guard)
}
