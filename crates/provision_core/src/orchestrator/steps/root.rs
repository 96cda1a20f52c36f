//! Root step - restarts the device daemon with root privileges.
//!
//! Shared by the install and backup pipelines. When the daemon restarts the
//! connection drops, so the step reconnects and waits for the device to
//! come back before handing over.

use crate::config::ms;
use crate::device::{classify, pause};
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, StepOutcome};

pub struct RootStep;

impl RootStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RootStep {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PipelineStep<S> for RootStep {
    fn name(&self) -> &str {
        "Root"
    }

    fn description(&self) -> &str {
        "Acquire root access"
    }

    fn execute(&self, ctx: &Context, _state: &mut S) -> StepResult<StepOutcome> {
        let timing = ctx.timing();
        let output = match ctx.run(&["root"], ms(timing.command_timeout_ms)) {
            Ok(out) => out,
            Err(e) => {
                return Ok(StepOutcome::warning(format!(
                    "root access not confirmed: {}",
                    classify(&e)
                )));
            }
        };

        if !output.contains("restarting") {
            ctx.logger.info("Root access already granted");
            return Ok(StepOutcome::Completed);
        }

        ctx.logger.info("Device daemon restarting as root, waiting...");
        pause(ms(timing.root_restart_delay_ms));
        if let Err(e) = ctx.guard.reconnect(ctx.address()) {
            tracing::debug!("connect after root restart failed: {}", e);
        }

        if ctx.guard.wait_until_ready(
            ctx.address(),
            ms(timing.root_ready_wait_ms),
            ms(timing.ready_poll_interval_ms),
        ) {
            ctx.logger.success("Root access granted");
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::warning("device not ready after root restart"))
        }
    }
}
