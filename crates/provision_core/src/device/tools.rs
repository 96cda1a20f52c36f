//! Locating the device tool and mirror tool executables.
//!
//! A tools directory shipped next to the application takes priority over
//! whatever is on PATH.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::runner::{CommandExecutor, DeviceCommandRunner};

/// Timeout for the availability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// An executable that answered its version probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub path: PathBuf,
    /// Whether the bundled copy was used rather than PATH.
    pub bundled: bool,
}

/// Platform executable file name (`adb` → `adb.exe` on Windows).
pub fn executable_name(base: &str) -> String {
    if cfg!(windows) && !base.ends_with(".exe") {
        format!("{}.exe", base)
    } else {
        base.to_string()
    }
}

/// Bundled path if it exists, otherwise the bare name for PATH lookup.
pub fn preferred_path(tools_dir: &Path, name: &str) -> PathBuf {
    let bundled = tools_dir.join(executable_name(name));
    if bundled.exists() {
        bundled
    } else {
        PathBuf::from(name)
    }
}

/// Find a working device tool: bundled first, then PATH.
///
/// A candidate counts only if `<tool> version` succeeds.
pub fn locate_device_tool(tools_dir: &Path, name: &str) -> Option<ResolvedTool> {
    let bundled = tools_dir.join(executable_name(name));
    let mut candidates = Vec::new();
    if bundled.exists() {
        candidates.push((bundled, true));
    }
    candidates.push((PathBuf::from(name), false));

    for (path, is_bundled) in candidates {
        let runner = DeviceCommandRunner::new(&path).with_tools_dir(tools_dir);
        match runner.run(None, &["version"], PROBE_TIMEOUT) {
            Ok(version) => {
                tracing::info!(
                    "Device tool available: {} ({})",
                    path.display(),
                    version.lines().next().unwrap_or("").trim()
                );
                return Some(ResolvedTool {
                    path,
                    bundled: is_bundled,
                });
            }
            Err(e) => {
                tracing::debug!("Device tool candidate {} unusable: {}", path.display(), e);
            }
        }
    }

    tracing::error!("Device tool '{}' not found", name);
    None
}
