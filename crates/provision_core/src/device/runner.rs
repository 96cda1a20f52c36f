//! Device command runner.
//!
//! Every interaction with a device goes through [`CommandExecutor::run`],
//! which makes error classification uniform across the orchestrator.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::errors::{DeviceError, DeviceResult};
use super::types::DeviceAddress;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Executes one device-tool command.
///
/// With `device` set the command is scoped to that device (`-s <addr>`),
/// otherwise it is a global command such as `connect` or `kill-server`.
pub trait CommandExecutor: Send + Sync {
    fn run(
        &self,
        device: Option<&DeviceAddress>,
        args: &[&str],
        timeout: Duration,
    ) -> DeviceResult<String>;
}

/// Runs the real device tool as a child process.
#[derive(Debug, Clone)]
pub struct DeviceCommandRunner {
    /// Tool executable (path or bare name resolved via PATH).
    tool: PathBuf,
    /// Bundled tools directory prepended to the child's PATH.
    tools_dir: Option<PathBuf>,
}

impl DeviceCommandRunner {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            tools_dir: None,
        }
    }

    /// Prepend a directory to the PATH of every spawned command.
    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = Some(dir.into());
        self
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Full argument vector, including the `-s` scope.
    fn full_args(device: Option<&DeviceAddress>, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(addr) = device {
            full.push("-s".to_string());
            full.push(addr.to_string());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Human-readable command line for logs and error messages.
    pub fn describe(&self, device: Option<&DeviceAddress>, args: &[&str]) -> String {
        let mut line = self.tool.display().to_string();
        for arg in Self::full_args(device, args) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    fn build_command(&self, device: Option<&DeviceAddress>, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.tool);
        cmd.args(Self::full_args(device, args))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(ref dir) = self.tools_dir {
            if let Some(path) = prepend_path(dir) {
                cmd.env("PATH", path);
            }
        }

        hide_console_window(&mut cmd);
        cmd
    }
}

impl CommandExecutor for DeviceCommandRunner {
    fn run(
        &self,
        device: Option<&DeviceAddress>,
        args: &[&str],
        timeout: Duration,
    ) -> DeviceResult<String> {
        let description = self.describe(device, args);
        tracing::debug!("Device tool: {}", description);

        let mut child = self
            .build_command(device, args)
            .spawn()
            .map_err(|e| DeviceError::launch(self.tool.display().to_string(), e))?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match wait_with_timeout(&mut child, timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::debug!("Device tool timed out: {}", description);
                return Err(DeviceError::timeout(description, timeout));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(DeviceError::launch(self.tool.display().to_string(), e));
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        let exit_code = (!status.success()).then(|| status.code().unwrap_or(-1));

        check_exit(description, args, exit_code, stdout, &stderr)
    }
}

/// File transfers that must exit zero even when stderr is empty.
const STRICT_SUBCOMMANDS: &[&str] = &["push", "pull"];

/// Turn a finished command into its result.
///
/// A non-zero exit is an error when stderr has text. `push` and `pull` also
/// fail on a quiet non-zero exit, reporting stdout instead. Any other command
/// returns stdout.
fn check_exit(
    description: String,
    args: &[&str],
    exit_code: Option<i32>,
    stdout: String,
    stderr: &str,
) -> DeviceResult<String> {
    if let Some(code) = exit_code {
        let stderr = stderr.trim();
        let strict = args
            .first()
            .is_some_and(|sub| STRICT_SUBCOMMANDS.contains(sub));
        if !stderr.is_empty() {
            tracing::debug!("Device tool error: {}", stderr);
            return Err(DeviceError::command(description, code, stderr));
        }
        if strict {
            tracing::debug!("Device tool exited with {}: {}", code, stdout.trim());
            return Err(DeviceError::command(description, code, stdout.trim()));
        }
    }

    if !stdout.is_empty() {
        let preview: String = stdout.chars().take(200).collect();
        tracing::trace!("Device tool output: {}", preview);
    }

    Ok(stdout)
}

/// Poll the child until it exits or `timeout` passes.
///
/// Returns `Ok(None)` on timeout; the child is still running then.
pub(crate) fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Drain a child pipe on its own thread so a full pipe never stalls the child.
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// PATH value with `dir` in front of the inherited entries.
pub(crate) fn prepend_path(dir: &Path) -> Option<OsString> {
    let mut entries = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        entries.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(entries).ok()
}

#[cfg(windows)]
pub(crate) fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
pub(crate) fn hide_console_window(_cmd: &mut Command) {}
