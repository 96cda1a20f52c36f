//! Backup steps - pull the installed app and its data off the device.
//!
//! Every pull is independent; a failed pull is recorded and logged as a
//! warning and the next one still runs.

use std::path::PathBuf;

use crate::device::classify;
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{BackupState, Context, StepOutcome};
use crate::payload::{DevicePaths, PayloadLayout};

/// Pulls the installed package binary into `apk_files/`.
pub struct PullPackageStep;

impl PullPackageStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PullPackageStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<BackupState> for PullPackageStep {
    fn name(&self) -> &str {
        "PullPackage"
    }

    fn description(&self) -> &str {
        "Back up the app package"
    }

    fn execute(&self, ctx: &Context, state: &mut BackupState) -> StepResult<StepOutcome> {
        let label = "package";
        let package = ctx.app().app_package.as_str();

        let remote = match ctx.shell(&["pm", "path", package]) {
            Ok(out) => out
                .lines()
                .find_map(|l| l.trim().strip_prefix("package:"))
                .map(str::to_string)
                .unwrap_or_default(),
            Err(e) => {
                let reason = classify(&e).to_string();
                state.record(label, Err(reason.clone()));
                return Ok(StepOutcome::warning(format!("package path lookup failed: {}", reason)));
            }
        };

        if remote.is_empty() {
            state.record(label, Err("package not installed".to_string()));
            return Ok(StepOutcome::warning(format!("{} is not installed", package)));
        }

        let local = ctx.payload.package_file(&ctx.app().backup_apk_name);
        match ctx.pull(&remote, &local) {
            Ok(_) => {
                ctx.logger.success("App package backed up");
                state.record(label, Ok(()));
                Ok(StepOutcome::Completed)
            }
            Err(e) => {
                let reason = classify(&e).to_string();
                state.record(label, Err(reason.clone()));
                Ok(StepOutcome::warning(format!("package pull failed: {}", reason)))
            }
        }
    }
}

type RemotePath = fn(&DevicePaths) -> String;
type LocalPath = fn(&PayloadLayout, &str) -> PathBuf;

/// Pulls one remote path to one local path.
pub struct PullStep {
    name: &'static str,
    description: &'static str,
    label: &'static str,
    remote: RemotePath,
    local: LocalPath,
}

impl PullStep {
    /// `/sdcard/Android/data/<pkg>/files` into `sdcard/`.
    pub fn sdcard() -> Self {
        Self {
            name: "PullSdcard",
            description: "Back up external storage files",
            label: "sdcard",
            remote: DevicePaths::external_files_dir,
            local: |layout, _| layout.sdcard_dir(),
        }
    }

    /// `/data/data/<pkg>/files` into `data/`.
    pub fn app_files() -> Self {
        Self {
            name: "PullAppFiles",
            description: "Back up app files",
            label: "app_files",
            remote: DevicePaths::files_dir,
            local: |layout, _| layout.data_dir(),
        }
    }

    pub fn database() -> Self {
        Self {
            name: "PullDatabase",
            description: "Back up the database",
            label: "database",
            remote: DevicePaths::database_file,
            local: |layout, _| layout.database(),
        }
    }

    pub fn preferences() -> Self {
        Self {
            name: "PullPreferences",
            description: "Back up preferences",
            label: "preferences",
            remote: DevicePaths::preferences_file,
            local: |layout, package| layout.preferences(package),
        }
    }
}

impl PipelineStep<BackupState> for PullStep {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn execute(&self, ctx: &Context, state: &mut BackupState) -> StepResult<StepOutcome> {
        let remote = (self.remote)(&ctx.device_paths());
        let local = (self.local)(&ctx.payload, &ctx.app().app_package);

        match ctx.pull(&remote, &local) {
            Ok(_) => {
                ctx.logger.success(&format!("{} backed up", self.label));
                state.record(self.label, Ok(()));
                Ok(StepOutcome::Completed)
            }
            Err(e) => {
                let reason = classify(&e).to_string();
                state.record(self.label, Err(reason.clone()));
                Ok(StepOutcome::warning(format!("{} pull failed: {}", self.label, reason)))
            }
        }
    }
}
