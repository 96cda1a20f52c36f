//! Provisioning orchestrator: install and backup pipelines.
//!
//! A device run is a fixed sequence of steps over one [`Context`]. Steps
//! never abort the run; what went wrong is recorded in the run state and
//! summarized at the end.
//!
//! ```text
//! Install pipeline                 Backup pipeline
//!     ├── Root                         ├── Root
//!     ├── InstallPackages              ├── PullPackage
//!     ├── GrantPermissions             ├── PullSdcard
//!     ├── LaunchApp                    ├── PullAppFiles
//!     ├── StartMirror                  ├── PullDatabase
//!     ├── TransferPayload              └── PullPreferences
//!     ├── FixOwnership
//!     ├── Verify
//!     ├── Reboot
//!     └── Settle
//! ```
//!
//! [`ProvisioningDriver`] runs these pipelines over a batch of devices.

mod driver;
mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;

pub use driver::{
    BackupReport, BatchReport, CategoryCount, DeviceRunReport, DriverEvent, ProvisioningDriver,
    RunCallbacks, SharedLogCallback,
};
pub use errors::{ProvisionError, ProvisionResult, StepError, StepResult};
pub use pipeline::{Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{
    FixOwnershipStep, GrantPermissionsStep, InstallPackagesStep, LaunchAppStep, PullPackageStep,
    PullStep, RebootStep, RootStep, SettleStep, StartMirrorStep, TransferPayloadStep, VerifyStep,
};
pub use types::{BackupState, Context, InstallState, ProgressCallback, StepOutcome};

/// The ten install steps in run order.
pub fn create_install_pipeline() -> Pipeline<InstallState> {
    Pipeline::new()
        .with_step(RootStep::new())
        .with_step(InstallPackagesStep::new())
        .with_step(GrantPermissionsStep::new())
        .with_step(LaunchAppStep::new())
        .with_step(StartMirrorStep::new())
        .with_step(TransferPayloadStep::new())
        .with_step(FixOwnershipStep::new())
        .with_step(VerifyStep::new())
        .with_step(RebootStep::new())
        .with_step(SettleStep::new())
}

/// The six backup steps in run order.
pub fn create_backup_pipeline() -> Pipeline<BackupState> {
    Pipeline::new()
        .with_step(RootStep::new())
        .with_step(PullPackageStep::new())
        .with_step(PullStep::sdcard())
        .with_step(PullStep::app_files())
        .with_step(PullStep::database())
        .with_step(PullStep::preferences())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_pipeline_order() {
        let pipeline = create_install_pipeline();
        assert_eq!(
            pipeline.step_names(),
            vec![
                "Root",
                "InstallPackages",
                "GrantPermissions",
                "LaunchApp",
                "StartMirror",
                "TransferPayload",
                "FixOwnership",
                "Verify",
                "Reboot",
                "Settle",
            ]
        );
    }

    #[test]
    fn backup_pipeline_has_six_steps() {
        let pipeline = create_backup_pipeline();
        assert_eq!(pipeline.step_count(), 6);
        assert_eq!(pipeline.step_names()[0], "Root");
    }
}
