use crate::artifact::Artifact;
use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};

/// Leaves nothing behind; the container goes away with the run cleanup.
#[derive(Debug, Default)]
pub struct StepDiscard;

impl Step for StepDiscard {
    fn name(&self) -> &'static str {
        "discard"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        ctx.ui.say("Discarding the container");
        ctx.artifact = Some(Artifact::Discarded);
        StepAction::Continue
    }
}
