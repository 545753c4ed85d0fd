use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};
use crate::CoreError;
use podbake_runtime::ContainerConfig;
use tracing::debug;

/// Starts the build container with the scratch dir mounted.
#[derive(Debug, Default)]
pub struct StepRun;

impl StepRun {
    fn container_config(ctx: &BuildContext) -> Result<ContainerConfig, CoreError> {
        let temp_dir = ctx.require_temp_dir()?;
        let config = &ctx.config;
        let mut volumes = config.volumes.clone();
        volumes.insert(
            temp_dir.to_string_lossy().into_owned(),
            config.container_dir.clone(),
        );
        Ok(ContainerConfig {
            image: config.image.clone(),
            run_command: config.rendered_run_command(),
            device: config.device.clone(),
            cap_add: config.cap_add.clone(),
            cap_drop: config.cap_drop.clone(),
            volumes,
            tmpfs: config.tmpfs.clone(),
            privileged: config.privileged,
            systemd: config.systemd.clone(),
        })
    }
}

impl Step for StepRun {
    fn name(&self) -> &'static str {
        "run"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        let container = match Self::container_config(ctx) {
            Ok(container) => container,
            Err(e) => return ctx.fail(e),
        };

        ctx.ui.say("Starting container...");
        match ctx.driver.start_container(&container) {
            Ok(id) => {
                ctx.ui.message(&format!("Container ID: {id}"));
                ctx.container_id = Some(id.clone());
                ctx.instance_id = Some(id);
                StepAction::Continue
            }
            Err(e) => ctx.fail(e),
        }
    }

    fn cleanup(&mut self, ctx: &mut BuildContext) {
        let Some(id) = ctx.container_id.take() else {
            return;
        };
        ctx.instance_id = None;
        ctx.ui.say(&format!("Killing the container: {id}"));
        if let Err(e) = ctx.driver.kill_container(&id) {
            debug!("failed to kill container {id}: {e}");
        }
    }
}
