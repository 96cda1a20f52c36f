//! Pipeline runner that executes steps in sequence.

use super::step::PipelineStep;
use super::types::{Context, StepOutcome};

/// Ordered list of steps sharing one state type.
///
/// Every step runs, whatever happened to the ones before it.
pub struct Pipeline<S> {
    steps: Vec<Box<dyn PipelineStep<S>>>,
}

impl<S> Default for Pipeline<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Pipeline<S> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step<T: PipelineStep<S> + 'static>(&mut self, step: T) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<T: PipelineStep<S> + 'static>(mut self, step: T) -> Self {
        self.add_step(step);
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order against `state`.
    pub fn run(&self, ctx: &Context, state: &mut S) -> PipelineRunResult {
        let mut result = PipelineRunResult::default();
        let total = self.steps.len();

        for (i, step) in self.steps.iter().enumerate() {
            let name = step.name();
            ctx.logger.step(i + 1, total, step.description());
            ctx.report_progress(name, percent(i, total), step.description());
            ctx.logger.clear_tail();

            let outcome = match step.execute(ctx, state) {
                Ok(outcome) => outcome,
                Err(e) => {
                    let classification = e.classification();
                    tracing::debug!("Step '{}' error: {}", name, e);
                    ctx.logger.show_tail(name);
                    StepOutcome::SoftFailed(format!("{}: {}", e, classification))
                }
            };

            match outcome {
                StepOutcome::Completed => {}
                StepOutcome::CompletedWithWarning(ref reason) => {
                    ctx.logger.warn(&format!("{}: {}", name, reason));
                }
                StepOutcome::SoftFailed(ref reason) => {
                    ctx.logger.warn(&format!("{} failed: {}", name, reason));
                }
            }
            result.record(name, outcome);
        }

        ctx.report_progress("Done", 100, "All steps finished");
        result
    }
}

fn percent(index: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((index * 100) / total) as u32
}

/// What happened to each step of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRunResult {
    pub completed: Vec<String>,
    pub warned: Vec<(String, String)>,
    pub soft_failed: Vec<(String, String)>,
}

impl PipelineRunResult {
    fn record(&mut self, name: &str, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Completed => self.completed.push(name.to_string()),
            StepOutcome::CompletedWithWarning(reason) => self.warned.push((name.to_string(), reason)),
            StepOutcome::SoftFailed(reason) => self.soft_failed.push((name.to_string(), reason)),
        }
    }

    /// Steps that ran, whatever their outcome.
    pub fn steps_run(&self) -> usize {
        self.completed.len() + self.warned.len() + self.soft_failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.warned.is_empty() && self.soft_failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::orchestrator::errors::{StepError, StepResult};
    use crate::test_support::{test_context, ScriptedDevice};
    use std::sync::Arc;
    use std::time::Duration;

    struct Recording(&'static str, fn() -> StepResult<StepOutcome>);

    impl PipelineStep<Vec<String>> for Recording {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _ctx: &Context, state: &mut Vec<String>) -> StepResult<StepOutcome> {
            state.push(self.0.to_string());
            (self.1)()
        }
    }

    #[test]
    fn failing_steps_never_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(Arc::new(ScriptedDevice::new()), dir.path());

        let pipeline = Pipeline::new()
            .with_step(Recording("one", || Ok(StepOutcome::Completed)))
            .with_step(Recording("two", || {
                Err(StepError::from(DeviceError::timeout("push", Duration::from_secs(1))))
            }))
            .with_step(Recording("three", || Ok(StepOutcome::warning("slow"))))
            .with_step(Recording("four", || Ok(StepOutcome::soft_failed("owner"))));

        let mut order = Vec::new();
        let result = pipeline.run(&ctx, &mut order);

        assert_eq!(order, vec!["one", "two", "three", "four"]);
        assert_eq!(result.steps_run(), 4);
        assert_eq!(result.completed, vec!["one"]);
        assert_eq!(result.warned.len(), 1);
        assert_eq!(result.soft_failed.len(), 2);
        assert!(result.soft_failed[0].1.contains("check network"));
        assert!(!result.is_clean());
    }

    #[test]
    fn percent_is_bounded() {
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(5, 10), 50);
        assert_eq!(percent(0, 0), 100);
    }
}
