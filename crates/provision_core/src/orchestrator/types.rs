//! Shared types for provisioning pipelines.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ms, PayloadSettings, Settings, TimingSettings};
use crate::device::{CommandExecutor, ConnectionGuard, Device, DeviceAddress, DeviceResult};
use crate::logging::RunLogger;
use crate::mirror::MirrorTrigger;
use crate::payload::{DevicePaths, PayloadLayout};
use crate::transfer::TransferTracker;

/// Progress callback: (step name, percent, message).
pub type ProgressCallback = Arc<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Read-only state shared by every step of one device run.
pub struct Context {
    pub device: Device,
    pub settings: Arc<Settings>,
    /// Payload being installed, or the backup being written.
    pub payload: PayloadLayout,
    pub logger: Arc<RunLogger>,
    pub executor: Arc<dyn CommandExecutor>,
    pub guard: ConnectionGuard,
    /// Mirror supervisor, when one is running.
    pub mirror: Option<Arc<dyn MirrorTrigger>>,
    pub progress_callback: Option<ProgressCallback>,
}

impl Context {
    pub fn new(
        device: Device,
        settings: Arc<Settings>,
        payload: PayloadLayout,
        logger: Arc<RunLogger>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let guard = ConnectionGuard::new(executor.clone(), settings.timing.guard_timing())
            .with_logger(logger.clone());
        Self {
            device,
            settings,
            payload,
            logger,
            executor,
            guard,
            mirror: None,
            progress_callback: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Option<Arc<dyn MirrorTrigger>>) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.device.address
    }

    pub fn timing(&self) -> &TimingSettings {
        &self.settings.timing
    }

    pub fn app(&self) -> &PayloadSettings {
        &self.settings.payload
    }

    pub fn device_paths(&self) -> DevicePaths {
        DevicePaths::new(self.app().app_package.clone())
    }

    /// Run a device-scoped command, echoing it and its output to the run log.
    pub fn run(&self, args: &[&str], timeout: Duration) -> DeviceResult<String> {
        self.logger.command(&args.join(" "));
        match self.executor.run(Some(self.address()), args, timeout) {
            Ok(stdout) => {
                for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
                    self.logger.output_line(line, false);
                }
                Ok(stdout)
            }
            Err(e) => {
                self.logger.output_line(&e.to_string(), true);
                Err(e)
            }
        }
    }

    /// [`run`](Self::run) with the general command timeout.
    pub fn shell(&self, args: &[&str]) -> DeviceResult<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.run(&full, ms(self.timing().command_timeout_ms))
    }

    /// `push <local> <remote>`.
    pub fn push(&self, local: &str, remote: &str, timeout: Duration) -> DeviceResult<String> {
        self.run(&["push", local, remote], timeout)
    }

    /// `pull <remote> <local>`.
    pub fn pull(&self, remote: &str, local: &Path) -> DeviceResult<String> {
        let local = local.to_string_lossy();
        self.run(
            &["pull", remote, local.as_ref()],
            ms(self.timing().pull_timeout_ms),
        )
    }

    pub fn report_progress(&self, step: &str, percent: u32, message: &str) {
        if let Some(ref cb) = self.progress_callback {
            cb(step, percent, message);
        }
    }
}

/// Result of a single step. A device run never hard-aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    CompletedWithWarning(String),
    SoftFailed(String),
}

impl StepOutcome {
    pub fn warning(reason: impl Into<String>) -> Self {
        Self::CompletedWithWarning(reason.into())
    }

    pub fn soft_failed(reason: impl Into<String>) -> Self {
        Self::SoftFailed(reason.into())
    }

    /// `Completed` when `warnings` is empty, otherwise a joined warning.
    pub fn from_warnings(warnings: Vec<String>) -> Self {
        if warnings.is_empty() {
            Self::Completed
        } else {
            Self::CompletedWithWarning(warnings.join("; "))
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed)
    }
}

/// Mutable state of one install run.
#[derive(Debug, Clone, Default)]
pub struct InstallState {
    pub transfers: TransferTracker,
    /// Package files that installed successfully.
    pub installed_packages: Vec<String>,
    /// Items missing from the device after verification.
    pub missing: Vec<String>,
}

impl InstallState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Mutable state of one backup run.
#[derive(Debug, Clone, Default)]
pub struct BackupState {
    /// Labels of artifacts pulled.
    pub pulled: Vec<String>,
    /// Labels of artifacts that failed, with reason.
    pub failed: Vec<(String, String)>,
}

impl BackupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: &str, result: Result<(), String>) {
        match result {
            Ok(()) => self.pulled.push(label.to_string()),
            Err(reason) => self.failed.push((label.to_string(), reason)),
        }
    }
}
