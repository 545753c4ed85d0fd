//! Build orchestration for podbake.
//!
//! This crate ties the configuration and the engine layer together: the
//! typed `BuildContext` shared by the steps, the `Pipeline` that runs steps
//! in order and cleans them up in reverse, the steps themselves (scratch dir,
//! pull, run, connect, provision, and the commit/export/discard finalizers),
//! the shell and file provisioners, and the `Builder` that assembles a
//! pipeline from a `BuildConfig`.

pub mod artifact;
pub mod builder;
pub mod cancel;
pub mod context;
pub mod pipeline;
pub mod provision;
pub mod steps;
pub mod ui;

pub use artifact::Artifact;
pub use builder::Builder;
pub use cancel::{install_signal_handler, CancelToken};
pub use context::BuildContext;
pub use pipeline::{Outcome, Pipeline, PipelineState, Step, StepAction};
pub use ui::{MemoryUi, TracingUi, Ui};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] podbake_schema::ConfigError),
    #[error("runtime error: {0}")]
    Runtime(#[from] podbake_runtime::RuntimeError),
    #[error("build state '{0}' is missing; steps ran out of order")]
    MissingState(&'static str),
    #[error("provisioning command '{command}' exited with status {status}")]
    ProvisionFailed { command: String, status: i32 },
    #[error("build cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
