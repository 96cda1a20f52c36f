//! Payload steps - push data, fix ownership, verify.
//!
//! Each of the four payload categories is pushed independently with its own
//! retry budget, and the connection is checked before every attempt. Every
//! category ends with exactly one terminal record in the run's tracker.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ms;
use crate::device::{classify_text, pause};
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, InstallState, StepOutcome};
use crate::payload::{count_files, DATABASE_FILE};
use crate::transfer::TransferCategory;

/// One push: local source, argument passed to the tool, destination.
struct PushPlan {
    category: TransferCategory,
    source: PathBuf,
    source_arg: String,
    destination: String,
    timeout: Duration,
    count: Option<usize>,
}

fn push_plans(ctx: &Context) -> Vec<PushPlan> {
    let timing = ctx.timing();
    let paths = ctx.device_paths();
    let sdcard = ctx.payload.sdcard_files();
    let app_files = ctx.payload.data_files();
    let database = ctx.payload.database();
    let preferences = ctx.payload.preferences(&ctx.app().app_package);

    vec![
        PushPlan {
            category: TransferCategory::Sdcard,
            source_arg: sdcard.to_string_lossy().into_owned(),
            count: Some(count_files(&sdcard)),
            source: sdcard,
            destination: format!("{}/", paths.external_dir()),
            timeout: ms(timing.sdcard_push_timeout_ms),
        },
        PushPlan {
            category: TransferCategory::AppFiles,
            // trailing "/." pushes the folder contents, not the folder
            source_arg: format!("{}/.", app_files.to_string_lossy()),
            count: Some(count_files(&app_files)),
            source: app_files,
            destination: format!("{}/", paths.files_dir()),
            timeout: ms(timing.app_files_push_timeout_ms),
        },
        PushPlan {
            category: TransferCategory::Database,
            source_arg: database.to_string_lossy().into_owned(),
            count: None,
            source: database,
            destination: format!("{}/", paths.databases_dir()),
            timeout: ms(timing.database_push_timeout_ms),
        },
        PushPlan {
            category: TransferCategory::Preferences,
            source_arg: preferences.to_string_lossy().into_owned(),
            count: None,
            source: preferences,
            destination: format!("{}/", paths.shared_prefs_dir()),
            timeout: ms(timing.preferences_push_timeout_ms),
        },
    ]
}

/// Remounts, creates the app directories and pushes the four categories.
pub struct TransferPayloadStep;

impl TransferPayloadStep {
    pub fn new() -> Self {
        Self
    }

    fn prepare(&self, ctx: &Context) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = ctx.run(&["remount"], ms(ctx.timing().command_timeout_ms)) {
            ctx.logger.warn(&format!("remount failed: {}", e));
            warnings.push("remount failed".to_string());
        }

        for dir in ctx.device_paths().transfer_dirs() {
            if let Err(e) = ctx.shell(&["mkdir", "-p", dir.as_str()]) {
                ctx.logger.warn(&format!("mkdir {} failed: {}", dir, e));
                warnings.push(format!("could not create {}", dir));
            }
        }
        warnings
    }

    /// Returns `true` when the category succeeded.
    fn push(&self, ctx: &Context, state: &mut InstallState, plan: &PushPlan) -> bool {
        let name = plan.category.display_name();

        if !plan.source.exists() {
            let error = format!("{} not found", plan.source.display());
            ctx.logger.warn(&format!("{}: {}", name, error));
            state.transfers.record_failure(plan.category, error);
            return false;
        }

        ctx.logger.info(&format!("Transferring {}...", name));
        let timing = ctx.timing();
        let attempts = timing.transfer_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                ctx.logger.warn(&format!(
                    "{} failed: {} (retry {}/{})",
                    name,
                    classify_text(&last_error),
                    attempt,
                    attempts
                ));
                pause(ms(timing.transfer_retry_delay_ms));
            }

            if let Err(e) = ctx
                .guard
                .require_connected(ctx.address(), timing.connect_attempts)
            {
                last_error = e.to_string();
                continue;
            }

            match ctx.push(&plan.source_arg, &plan.destination, plan.timeout) {
                Ok(_) => {
                    match plan.count {
                        Some(count) => ctx.logger.success(&format!("{}: {} files", name, count)),
                        None => ctx.logger.success(&format!("{} transferred", name)),
                    }
                    state.transfers.record_success(plan.category, plan.count);
                    return true;
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        let classification = classify_text(&last_error);
        ctx.logger.error(&format!(
            "{} failed after {} attempts: {}",
            name, attempts, classification
        ));
        state.transfers.record_failure(plan.category, last_error);
        false
    }
}

impl Default for TransferPayloadStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for TransferPayloadStep {
    fn name(&self) -> &str {
        "TransferPayload"
    }

    fn description(&self) -> &str {
        "Transfer payload files"
    }

    fn execute(&self, ctx: &Context, state: &mut InstallState) -> StepResult<StepOutcome> {
        let mut warnings = self.prepare(ctx);

        for plan in push_plans(ctx) {
            if !self.push(ctx, state, &plan) {
                warnings.push(format!("{} transfer failed", plan.category));
            }
        }

        Ok(StepOutcome::from_warnings(warnings))
    }
}

/// Gives the pushed files back to the app's user.
pub struct FixOwnershipStep;

impl FixOwnershipStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FixOwnershipStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for FixOwnershipStep {
    fn name(&self) -> &str {
        "FixOwnership"
    }

    fn description(&self) -> &str {
        "Fix file ownership"
    }

    fn execute(&self, ctx: &Context, state: &mut InstallState) -> StepResult<StepOutcome> {
        let paths = ctx.device_paths();
        let data_dir = paths.data_dir();

        let owner = match ctx.shell(&["stat", "-c", "%U", data_dir.as_str()]) {
            Ok(out) => out.trim().to_string(),
            Err(e) => {
                let error = e.to_string();
                state
                    .transfers
                    .record_failure(TransferCategory::Ownership, error.clone());
                return Ok(StepOutcome::soft_failed(format!(
                    "owner lookup failed: {}",
                    classify_text(&error)
                )));
            }
        };

        if owner.is_empty() || owner == "unknown" {
            state
                .transfers
                .record_failure(TransferCategory::Ownership, "owner unknown");
            return Ok(StepOutcome::soft_failed("app owner unknown"));
        }

        let spec = format!("{}:{}", owner, owner);
        for dir in [data_dir, paths.external_dir()] {
            if let Err(e) = ctx.shell(&["chown", "-R", spec.as_str(), dir.as_str()]) {
                let error = e.to_string();
                state
                    .transfers
                    .record_failure(TransferCategory::Ownership, error.clone());
                return Ok(StepOutcome::soft_failed(format!(
                    "chown {} failed: {}",
                    dir,
                    classify_text(&error)
                )));
            }
        }

        ctx.logger.success(&format!("Ownership set to {}", owner));
        state.transfers.record_owner(owner);
        Ok(StepOutcome::Completed)
    }
}

/// Checks that the database and app files landed on the device.
pub struct VerifyStep;

impl VerifyStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VerifyStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for VerifyStep {
    fn name(&self) -> &str {
        "Verify"
    }

    fn description(&self) -> &str {
        "Verify installation"
    }

    fn execute(&self, ctx: &Context, state: &mut InstallState) -> StepResult<StepOutcome> {
        let paths = ctx.device_paths();

        let database_present = ctx
            .shell(&["ls", paths.database_file().as_str()])
            .map(|out| out.contains(DATABASE_FILE))
            .unwrap_or(false);
        if database_present {
            ctx.logger.success("Database present");
        } else {
            state.missing.push("database".to_string());
        }

        let files_dir = format!("{}/", paths.files_dir());
        let files_present = ctx
            .shell(&["ls", files_dir.as_str()])
            .map(|out| !out.trim().is_empty())
            .unwrap_or(false);
        if files_present {
            ctx.logger.success("App files present");
        } else {
            state.missing.push("app files".to_string());
        }

        if state.missing.is_empty() {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::warning(format!(
                "missing on device: {}",
                state.missing.join(", ")
            )))
        }
    }
}
