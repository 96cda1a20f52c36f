//! Reboot and settle steps - apply device configuration and restart.

use crate::config::ms;
use crate::device::{classify, pause};
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, InstallState, StepOutcome};

/// Enable and select the configured keyboard. Returns failures as warnings.
fn select_keyboard(ctx: &Context) -> Vec<String> {
    let ime = ctx.app().keyboard_ime.as_str();
    let mut warnings = Vec::new();
    for args in [["ime", "enable", ime], ["ime", "set", ime]] {
        if let Err(e) = ctx.shell(&args) {
            tracing::debug!("{} failed: {}", args.join(" "), e);
            warnings.push(format!("{} {} failed", args[0], args[1]));
        }
    }
    warnings
}

/// Stops the app, sets locale and keyboard, reboots and waits for the
/// device to return.
pub struct RebootStep;

impl RebootStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RebootStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for RebootStep {
    fn name(&self) -> &str {
        "Reboot"
    }

    fn description(&self) -> &str {
        "Configure device and reboot"
    }

    fn execute(&self, ctx: &Context, _state: &mut InstallState) -> StepResult<StepOutcome> {
        let app = ctx.app();
        let timing = ctx.timing();
        let mut warnings = Vec::new();

        let configure: [&[&str]; 5] = [
            &["am", "force-stop", app.app_package.as_str()],
            &["settings", "put", "global", "system_locales", app.locale.as_str()],
            &["settings", "put", "system", "system_locales", app.locale.as_str()],
            &["setprop", "persist.sys.language", app.language.as_str()],
            &["setprop", "persist.sys.country", app.country.as_str()],
        ];
        for args in configure {
            if let Err(e) = ctx.shell(args) {
                tracing::debug!("{} failed: {}", args.join(" "), e);
                warnings.push(format!("{} failed", args[..2].join(" ")));
            }
        }
        warnings.extend(select_keyboard(ctx));

        if let Err(e) = ctx.run(&["reboot"], ms(timing.command_timeout_ms)) {
            warnings.push(format!("reboot failed: {}", classify(&e)));
            return Ok(StepOutcome::from_warnings(warnings));
        }

        ctx.logger.info("Rebooting, waiting for device...");
        pause(ms(timing.reboot_initial_delay_ms));
        if !ctx.guard.wait_until_ready(
            ctx.address(),
            ms(timing.reboot_ready_wait_ms),
            ms(timing.ready_poll_interval_ms),
        ) {
            warnings.push("device took longer than expected to come back".to_string());
        }

        Ok(StepOutcome::from_warnings(warnings))
    }
}

/// Waits for the rebooted system to settle, then sets keyboard and home app.
pub struct SettleStep;

impl SettleStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SettleStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep<InstallState> for SettleStep {
    fn name(&self) -> &str {
        "Settle"
    }

    fn description(&self) -> &str {
        "Finalize device settings"
    }

    fn execute(&self, ctx: &Context, _state: &mut InstallState) -> StepResult<StepOutcome> {
        pause(ms(ctx.timing().post_reboot_settle_ms));

        let mut warnings = select_keyboard(ctx);
        let home = ctx.app().home_component();
        match ctx.shell(&["cmd", "package", "set-home-activity", home.as_str()]) {
            Ok(_) => ctx.logger.success(&format!("Home app set to {}", home)),
            Err(e) => warnings.push(format!("home activity not set: {}", classify(&e))),
        }

        Ok(StepOutcome::from_warnings(warnings))
    }
}
