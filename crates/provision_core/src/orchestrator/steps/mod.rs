//! Pipeline step implementations.
//!
//! Install and backup runs share the root step; everything else belongs to
//! one of the two pipelines.

mod apps;
mod backup;
mod reboot;
mod root;
mod transfer;

pub use apps::{GrantPermissionsStep, InstallPackagesStep, LaunchAppStep, StartMirrorStep};
pub use backup::{PullPackageStep, PullStep};
pub use reboot::{RebootStep, SettleStep};
pub use root::RootStep;
pub use transfer::{FixOwnershipStep, TransferPayloadStep, VerifyStep};
