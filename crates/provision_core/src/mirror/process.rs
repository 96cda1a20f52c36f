//! Launching and controlling the mirror tool process.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::device::{hide_console_window, prepend_path, DeviceAddress};
use crate::device::tools::preferred_path;

use super::errors::{MirrorError, MirrorResult};

/// How a mirror process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorExit {
    /// `None` when killed by a signal.
    pub code: Option<i32>,
}

/// Everything needed to start one mirror attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub address: DeviceAddress,
    /// Unique per attempt; used to find the window afterwards.
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl LaunchRequest {
    pub fn args(&self) -> Vec<String> {
        vec![
            "-s".to_string(),
            self.address.to_string(),
            "--window-title".to_string(),
            self.title.clone(),
            "--window-borderless".to_string(),
            "--always-on-top".to_string(),
            "--window-width".to_string(),
            self.width.to_string(),
            "--window-height".to_string(),
            self.height.to_string(),
        ]
    }
}

/// A running mirror process.
pub trait MirrorProcess: Send {
    fn id(&self) -> u32;

    /// `Some` once the process has exited.
    fn try_wait(&mut self) -> io::Result<Option<MirrorExit>>;

    /// Ask the process to exit.
    fn terminate(&mut self) -> io::Result<()>;

    fn kill(&mut self) -> io::Result<()>;

    /// Wait up to `timeout`; `None` if still running.
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<MirrorExit>>;
}

/// Starts mirror processes.
pub trait MirrorLauncher: Send {
    /// Check the tool is installed and runs.
    fn probe(&self) -> MirrorResult<()>;

    fn launch(&self, request: &LaunchRequest) -> MirrorResult<Box<dyn MirrorProcess>>;
}

/// Launches the real mirror tool executable.
#[derive(Debug, Clone)]
pub struct ToolMirrorLauncher {
    tool: PathBuf,
    tools_dir: Option<PathBuf>,
    probe_timeout: Duration,
}

impl ToolMirrorLauncher {
    pub fn new(tool: impl Into<PathBuf>, probe_timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            tools_dir: None,
            probe_timeout,
        }
    }

    /// Use the bundled copy from `tools_dir` if present, and put `tools_dir`
    /// first on the child's PATH so it picks up the bundled device tool.
    pub fn bundled(tools_dir: &Path, name: &str, probe_timeout: Duration) -> Self {
        Self {
            tool: preferred_path(tools_dir, name),
            tools_dir: Some(tools_dir.to_path_buf()),
            probe_timeout,
        }
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    fn tool_name(&self) -> String {
        self.tool.display().to_string()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.tool);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(ref dir) = self.tools_dir {
            if dir.is_dir() {
                if let Some(path) = prepend_path(dir) {
                    cmd.env("PATH", path);
                }
            }
        }
        hide_console_window(&mut cmd);
        cmd
    }

    fn spawn_error(&self, err: io::Error) -> MirrorError {
        if err.kind() == io::ErrorKind::NotFound {
            MirrorError::unavailable(self.tool_name())
        } else {
            MirrorError::launch(self.tool_name(), err)
        }
    }
}

impl MirrorLauncher for ToolMirrorLauncher {
    fn probe(&self) -> MirrorResult<()> {
        let mut child = self
            .command()
            .arg("--version")
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        match crate::device::wait_with_timeout(&mut child, self.probe_timeout) {
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => {
                tracing::debug!("Mirror tool probe exited with {}", status);
                Err(MirrorError::unavailable(self.tool_name()))
            }
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::debug!("Mirror tool probe timed out");
                Err(MirrorError::unavailable(self.tool_name()))
            }
            Err(e) => Err(MirrorError::launch(self.tool_name(), e)),
        }
    }

    fn launch(&self, request: &LaunchRequest) -> MirrorResult<Box<dyn MirrorProcess>> {
        let args = request.args();
        tracing::debug!("Mirror command: {} {}", self.tool_name(), args.join(" "));

        let child = self
            .command()
            .args(&args)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        tracing::debug!("Mirror process started with PID {}", child.id());
        Ok(Box::new(ChildProcess { child }))
    }
}

/// A [`MirrorProcess`] backed by `std::process::Child`.
pub struct ChildProcess {
    child: Child,
}

impl MirrorProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<MirrorExit>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| MirrorExit { code: status.code() }))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let status = Command::new("kill")
            .args(["-TERM", &self.child.id().to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("kill -TERM exited with {}", status)))
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<MirrorExit>> {
        Ok(crate::device::wait_with_timeout(&mut self.child, timeout)?
            .map(|status| MirrorExit { code: status.code() }))
    }
}
