//! Pipeline step trait definition.

use super::errors::StepResult;
use super::types::{Context, StepOutcome};

/// One step of a device run, generic over the run's mutable state.
///
/// Steps record what they did in `state` and report how it went through
/// [`StepOutcome`]. Returning `Err` does not stop the pipeline: the error is
/// classified and logged as a soft failure, and the next step runs.
///
/// ```ignore
/// struct LaunchStep;
///
/// impl PipelineStep<InstallState> for LaunchStep {
///     fn name(&self) -> &str { "Launch" }
///
///     fn execute(&self, ctx: &Context, _state: &mut InstallState) -> StepResult<StepOutcome> {
///         ctx.shell(&["monkey", "-p", &ctx.app().app_package, "1"])?;
///         Ok(StepOutcome::Completed)
///     }
/// }
/// ```
pub trait PipelineStep<S>: Send + Sync {
    /// Short name used in progress reports and error context.
    fn name(&self) -> &str;

    /// Perform the step's work.
    fn execute(&self, ctx: &Context, state: &mut S) -> StepResult<StepOutcome>;

    /// Human-readable description printed in the step header.
    fn description(&self) -> &str {
        self.name()
    }
}
