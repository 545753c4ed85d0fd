use crate::artifact::Artifact;
use crate::cancel::CancelToken;
use crate::context::BuildContext;
use crate::pipeline::{Outcome, Pipeline, Step};
use crate::steps::{
    StepCommit, StepConnect, StepDiscard, StepExport, StepProvision, StepPull, StepRun,
    StepTempDir,
};
use crate::ui::Ui;
use crate::CoreError;
use podbake_runtime::{Communicator, Driver};
use podbake_schema::{ArtifactMode, BuildConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Assembles and runs the pipeline for one build.
pub struct Builder {
    config: Arc<BuildConfig>,
    driver: Arc<dyn Driver>,
    ui: Arc<dyn Ui>,
    cancel: CancelToken,
    communicator: Option<Arc<dyn Communicator>>,
    temp_root: Option<PathBuf>,
}

impl Builder {
    pub fn new(config: BuildConfig, driver: Arc<dyn Driver>, ui: Arc<dyn Ui>) -> Self {
        Self {
            config: Arc::new(config),
            driver,
            ui,
            cancel: CancelToken::new(),
            communicator: None,
            temp_root: None,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use `communicator` instead of connecting through the engine.
    #[must_use]
    pub fn with_communicator(mut self, communicator: Arc<dyn Communicator>) -> Self {
        self.communicator = Some(communicator);
        self
    }

    /// Create the scratch dir under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Steps in pipeline order, ending with the artifact step.
    pub fn steps(&self) -> Vec<Box<dyn Step>> {
        let connect = match &self.communicator {
            Some(comm) => StepConnect::with_communicator(Arc::clone(comm)),
            None => StepConnect::new(),
        };
        let finalize: Box<dyn Step> = match self.config.artifact_mode() {
            ArtifactMode::Commit => Box::new(StepCommit),
            ArtifactMode::Export(path) => Box::new(StepExport::new(path)),
            ArtifactMode::Discard => Box::new(StepDiscard),
        };
        vec![
            Box::new(StepTempDir::new(self.temp_root.clone())),
            Box::new(StepPull),
            Box::new(StepRun),
            Box::new(connect),
            Box::new(StepProvision),
            finalize,
        ]
    }

    pub fn build(&self) -> Result<Artifact, CoreError> {
        self.config.validate()?;
        self.driver.verify()?;
        info!(
            "building from {} with {}",
            self.config.image,
            self.driver.name()
        );

        let mut ctx = BuildContext::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.ui),
            Arc::clone(&self.config),
        );
        let mut pipeline = Pipeline::new(self.steps()).with_cancel(self.cancel.clone());
        let outcome = pipeline.run(&mut ctx);

        if let Some(err) = ctx.error.take() {
            return Err(err);
        }
        match outcome {
            Outcome::Completed => ctx.artifact.take().ok_or(CoreError::MissingState("artifact")),
            Outcome::Cancelled => Err(CoreError::Cancelled),
            Outcome::Halted => Err(CoreError::MissingState("error")),
        }
    }
}
