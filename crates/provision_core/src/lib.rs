//! Provision Core - device provisioning and screen mirroring backend.
//!
//! Everything here runs without a UI: front ends (the CLI) build a
//! [`orchestrator::ProvisioningDriver`] for device runs and host a
//! [`mirror::MirrorSupervisor`] on an [`event_loop::EventLoop`].

pub mod config;
pub mod device;
pub mod event_loop;
pub mod logging;
pub mod mirror;
pub mod orchestrator;
pub mod payload;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
