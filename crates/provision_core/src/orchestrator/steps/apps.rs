//! App steps - install packages, grant permissions, launch, start mirroring.

use crate::config::ms;
use crate::device::{classify, pause};
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, InstallState, StepOutcome};

/// Installs every configured package file found under `apk_files/`.
pub struct InstallPackagesStep;

impl InstallPackagesStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InstallPackagesStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for InstallPackagesStep {
    fn name(&self) -> &str {
        "InstallPackages"
    }

    fn description(&self) -> &str {
        "Install application packages"
    }

    fn execute(&self, ctx: &Context, state: &mut InstallState) -> StepResult<StepOutcome> {
        let timeout = ms(ctx.timing().install_timeout_ms);
        let mut warnings = Vec::new();

        for name in &ctx.app().package_files {
            let path = ctx.payload.package_file(name);
            if !path.is_file() {
                ctx.logger.warn(&format!("Package not found: {}", path.display()));
                warnings.push(format!("{} not found", name));
                continue;
            }

            ctx.logger.info(&format!("Installing {}...", name));
            let path = path.to_string_lossy();
            match ctx.run(&["install", "-r", path.as_ref()], timeout) {
                Ok(_) => {
                    ctx.logger.success(&format!("{} installed", name));
                    state.installed_packages.push(name.clone());
                }
                Err(e) => {
                    let classification = classify(&e);
                    ctx.logger.warn(&format!("{} install failed: {}", name, classification));
                    warnings.push(format!("{} not installed", name));
                }
            }
        }

        Ok(StepOutcome::from_warnings(warnings))
    }
}

/// Grants the configured runtime permissions. Refusals are expected on
/// some builds and only logged at debug level.
pub struct GrantPermissionsStep;

impl GrantPermissionsStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GrantPermissionsStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for GrantPermissionsStep {
    fn name(&self) -> &str {
        "GrantPermissions"
    }

    fn description(&self) -> &str {
        "Grant app permissions"
    }

    fn execute(&self, ctx: &Context, _state: &mut InstallState) -> StepResult<StepOutcome> {
        let package = ctx.app().app_package.as_str();
        for permission in &ctx.app().permissions {
            if let Err(e) = ctx.shell(&["pm", "grant", package, permission.as_str()]) {
                tracing::debug!("pm grant {} refused: {}", permission, e);
            }
        }
        ctx.logger.success("Permissions granted");
        Ok(StepOutcome::Completed)
    }
}

/// Starts the app through its launcher intent, then lets it settle.
pub struct LaunchAppStep;

impl LaunchAppStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LaunchAppStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for LaunchAppStep {
    fn name(&self) -> &str {
        "LaunchApp"
    }

    fn description(&self) -> &str {
        "Launch the app"
    }

    fn execute(&self, ctx: &Context, _state: &mut InstallState) -> StepResult<StepOutcome> {
        let package = ctx.app().app_package.as_str();
        let launched = ctx.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ]);
        pause(ms(ctx.timing().launch_settle_ms));

        match launched {
            Ok(_) => Ok(StepOutcome::Completed),
            Err(e) => Ok(StepOutcome::warning(format!("launch failed: {}", classify(&e)))),
        }
    }
}

/// Asks the mirror supervisor to show this device. Never blocks the run.
pub struct StartMirrorStep;

impl StartMirrorStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StartMirrorStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for StartMirrorStep {
    fn name(&self) -> &str {
        "StartMirror"
    }

    fn description(&self) -> &str {
        "Start screen mirroring"
    }

    fn execute(&self, ctx: &Context, _state: &mut InstallState) -> StepResult<StepOutcome> {
        let Some(ref mirror) = ctx.mirror else {
            return Ok(StepOutcome::warning("screen mirroring not available"));
        };

        if !mirror.start_mirror(&ctx.device) {
            return Ok(StepOutcome::warning("mirror supervisor is not running"));
        }

        ctx.logger.info("Screen mirroring requested");
        pause(ms(ctx.timing().mirror_settle_ms));
        Ok(StepOutcome::Completed)
    }
}
