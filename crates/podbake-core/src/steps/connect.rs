use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};
use crate::CoreError;
use podbake_runtime::{Communicator, CommunicatorSettings, PodmanCommunicator};
use std::sync::Arc;
use tracing::debug;

/// Binds a communicator to the running container.
#[derive(Default)]
pub struct StepConnect {
    /// Used instead of an engine-backed communicator when set.
    preset: Option<Arc<dyn Communicator>>,
}

impl StepConnect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_communicator(communicator: Arc<dyn Communicator>) -> Self {
        Self {
            preset: Some(communicator),
        }
    }

    fn connect(&self, ctx: &BuildContext) -> Result<Arc<dyn Communicator>, CoreError> {
        let id = ctx.require_container_id()?;
        let temp_dir = ctx.require_temp_dir()?;
        let version = ctx.driver.version()?;
        let container_user = ctx.driver.container_user(id)?;
        debug!("engine version {version}, container user '{container_user}'");

        if let Some(preset) = &self.preset {
            return Ok(Arc::clone(preset));
        }

        let config = &ctx.config;
        let mut settings =
            CommunicatorSettings::new(&config.engine, id, temp_dir, &config.container_dir);
        settings.version = version;
        settings.container_user = container_user;
        settings.exec_user.clone_from(&config.exec_user);
        settings.pty = config.pty;
        settings.fix_upload_owner = config.fix_upload_owner;
        Ok(Arc::new(PodmanCommunicator::new(settings)))
    }
}

impl Step for StepConnect {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        match self.connect(ctx) {
            Ok(communicator) => {
                ctx.communicator = Some(communicator);
                StepAction::Continue
            }
            Err(e) => ctx.fail(e),
        }
    }
}
