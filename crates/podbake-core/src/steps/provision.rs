use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};
use crate::provision::run_provisioner;
use std::sync::Arc;

/// Runs the configured provisioners in order, halting on the first failure.
#[derive(Debug, Default)]
pub struct StepProvision;

impl Step for StepProvision {
    fn name(&self) -> &'static str {
        "provision"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        let comm = match ctx.require_communicator() {
            Ok(comm) => comm,
            Err(e) => return ctx.fail(e),
        };
        let config = Arc::clone(&ctx.config);
        let ui = Arc::clone(&ctx.ui);
        for spec in &config.provisioners {
            if let Err(e) = run_provisioner(spec, &ui, comm.as_ref()) {
                return ctx.fail(e);
            }
        }
        StepAction::Continue
    }
}
