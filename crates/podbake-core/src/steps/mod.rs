//! The steps of a build, in pipeline order.

mod commit;
mod connect;
mod discard;
mod export;
mod provision;
mod pull;
mod run;
mod temp_dir;

pub use commit::StepCommit;
pub use connect::StepConnect;
pub use discard::StepDiscard;
pub use export::StepExport;
pub use provision::StepProvision;
pub use pull::{LoginSession, StepPull};
pub use run::StepRun;
pub use temp_dir::StepTempDir;
