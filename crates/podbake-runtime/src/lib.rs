//! Engine plumbing for podbake builds.
//!
//! This crate implements the execution layer: the `Driver` trait over the
//! container engine's command surface with a podman CLI implementation, the
//! `Communicator` that runs remote commands inside the build container and
//! moves files in and out of it through single-entry tar streams, and mock
//! implementations of both for tests.

pub mod archive;
pub mod communicator;
pub mod driver;
pub mod mock;
pub mod podman;
pub mod prereq;
pub mod remote;

mod process;

pub use communicator::{Communicator, CommunicatorSettings, PodmanCommunicator};
pub use driver::{CommitOptions, ContainerConfig, Driver};
pub use podman::PodmanDriver;
pub use prereq::{check_engine_prereqs, format_missing, MissingPrereq};
pub use process::exit_code;
pub use remote::{ExitStatusCell, RemoteCommand};

use std::fmt;
use thiserror::Error;

/// Exit status published when the engine process could not be spawned.
/// Lies above the `128 + signal` range used for signal deaths.
pub const SPAWN_FAILURE_STATUS: i32 = 254;

/// The stage of a file transfer that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    PipeSetup,
    TempFile,
    HeaderWrite,
    BodyCopy,
    ArchiveClose,
    StreamClose,
    ArchiveRead,
    OwnerFix,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStage::PipeSetup => write!(f, "pipe setup"),
            TransferStage::TempFile => write!(f, "temp file"),
            TransferStage::HeaderWrite => write!(f, "header write"),
            TransferStage::BodyCopy => write!(f, "body copy"),
            TransferStage::ArchiveClose => write!(f, "archive close"),
            TransferStage::StreamClose => write!(f, "stream close"),
            TransferStage::ArchiveRead => write!(f, "archive read"),
            TransferStage::OwnerFix => write!(f, "owner fix"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine '{0}' is not available on this system")]
    EngineUnavailable(String),
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("not logged in to '{0}'")]
    NotLoggedIn(String),
    #[error("failed to launch remote command: {0}")]
    Launch(String),
    #[error("{stage} failed for '{path}': {message}")]
    Transfer {
        stage: TransferStage,
        path: String,
        message: String,
    },
    #[error("failed to transfer '{path}' in container: {diagnostic}")]
    RemoteDiagnostic { path: String, diagnostic: String },
    #[error("{0} is not supported")]
    Unsupported(String),
}

impl RuntimeError {
    pub(crate) fn transfer(stage: TransferStage, path: &str, message: impl Into<String>) -> Self {
        RuntimeError::Transfer {
            stage,
            path: path.to_owned(),
            message: message.into(),
        }
    }

    /// The failing transfer stage, if this is a transfer error.
    pub fn stage(&self) -> Option<TransferStage> {
        match self {
            RuntimeError::Transfer { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
