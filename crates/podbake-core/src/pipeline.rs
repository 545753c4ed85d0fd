//! Sequential step runner with reverse-order cleanup.
//!
//! Steps run in order until one halts or all complete. Afterwards every step
//! that was started is cleaned up, last first, whatever the outcome. A
//! panicking cleanup is logged and the remaining cleanups still run; a
//! panicking step is treated as a halt and the panic resumes once cleanup is
//! done.

use crate::cancel::CancelToken;
use crate::context::BuildContext;
use crate::CoreError;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    Halt,
}

/// One unit of a build.
pub trait Step: Send {
    fn name(&self) -> &'static str;

    /// Do the step's work. Failures are recorded with `BuildContext::fail`.
    fn run(&mut self, ctx: &mut BuildContext) -> StepAction;

    /// Undo what `run` left behind. Must be a no-op when `run` did nothing
    /// and safe to call more than once.
    fn cleanup(&mut self, _ctx: &mut BuildContext) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Running(usize),
    Completed,
    Halted(usize),
    Cancelled(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Halted,
    Cancelled,
}

pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
    state: PipelineState,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            state: PipelineState::Pending,
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn run(&mut self, ctx: &mut BuildContext) -> Outcome {
        let mut started = 0;
        let mut outcome = Outcome::Completed;
        let mut step_panic = None;

        for (index, step) in self.steps.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                info!("build cancelled before step {}", step.name());
                if ctx.error.is_none() {
                    ctx.error = Some(CoreError::Cancelled);
                }
                self.state = PipelineState::Cancelled(index);
                outcome = Outcome::Cancelled;
                break;
            }

            self.state = PipelineState::Running(index);
            started = index + 1;
            debug!("running step {}", step.name());
            let action = match panic::catch_unwind(AssertUnwindSafe(|| step.run(ctx))) {
                Ok(action) => action,
                Err(payload) => {
                    warn!("step {} panicked", step.name());
                    step_panic = Some(payload);
                    StepAction::Halt
                }
            };

            if action == StepAction::Halt {
                debug!("step {} halted the build", step.name());
                self.state = PipelineState::Halted(index);
                outcome = Outcome::Halted;
                break;
            }
        }

        if outcome == Outcome::Completed {
            self.state = PipelineState::Completed;
        }
        self.cleanup(ctx, started);

        if let Some(payload) = step_panic {
            panic::resume_unwind(payload);
        }
        outcome
    }

    fn cleanup(&mut self, ctx: &mut BuildContext, started: usize) {
        for step in self.steps[..started].iter_mut().rev() {
            debug!("cleaning up step {}", step.name());
            if panic::catch_unwind(AssertUnwindSafe(|| step.cleanup(ctx))).is_err() {
                warn!("cleanup of step {} panicked", step.name());
            }
        }
    }
}
