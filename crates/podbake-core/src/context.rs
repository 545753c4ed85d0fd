use crate::artifact::Artifact;
use crate::pipeline::StepAction;
use crate::ui::Ui;
use crate::CoreError;
use podbake_runtime::{Communicator, Driver};
use podbake_schema::BuildConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State shared by the steps of one build.
///
/// Steps fill in the optional fields as they run; a field that is still
/// `None` when a later step needs it is an ordering defect.
pub struct BuildContext {
    pub driver: Arc<dyn Driver>,
    pub ui: Arc<dyn Ui>,
    pub config: Arc<BuildConfig>,
    /// Host scratch dir, mounted into the container.
    pub temp_dir: Option<PathBuf>,
    /// Handle of the live container. Cleared once the container is killed.
    pub container_id: Option<String>,
    pub instance_id: Option<String>,
    pub communicator: Option<Arc<dyn Communicator>>,
    /// First error recorded by a halting step.
    pub error: Option<CoreError>,
    pub artifact: Option<Artifact>,
}

impl BuildContext {
    pub fn new(driver: Arc<dyn Driver>, ui: Arc<dyn Ui>, config: Arc<BuildConfig>) -> Self {
        Self {
            driver,
            ui,
            config,
            temp_dir: None,
            container_id: None,
            instance_id: None,
            communicator: None,
            error: None,
            artifact: None,
        }
    }

    /// Report `err`, record it, and halt. An earlier error is kept.
    pub fn fail(&mut self, err: impl Into<CoreError>) -> StepAction {
        let err = err.into();
        self.ui.error(&err.to_string());
        if self.error.is_none() {
            self.error = Some(err);
        }
        StepAction::Halt
    }

    pub fn require_temp_dir(&self) -> Result<&Path, CoreError> {
        self.temp_dir
            .as_deref()
            .ok_or(CoreError::MissingState("temp_dir"))
    }

    pub fn require_container_id(&self) -> Result<&str, CoreError> {
        self.container_id
            .as_deref()
            .ok_or(CoreError::MissingState("container_id"))
    }

    pub fn require_communicator(&self) -> Result<Arc<dyn Communicator>, CoreError> {
        self.communicator
            .clone()
            .ok_or(CoreError::MissingState("communicator"))
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("driver", &self.driver.name())
            .field("temp_dir", &self.temp_dir)
            .field("container_id", &self.container_id)
            .field("instance_id", &self.instance_id)
            .field("communicator", &self.communicator.is_some())
            .field("error", &self.error)
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}
