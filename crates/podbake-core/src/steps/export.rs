use crate::artifact::Artifact;
use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};
use crate::CoreError;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Writes the container filesystem to a tarball on the host. A failed export
/// leaves no partial file behind.
#[derive(Debug)]
pub struct StepExport {
    path: PathBuf,
}

impl StepExport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn export(ctx: &BuildContext, path: &Path) -> Result<(), CoreError> {
        let id = ctx.require_container_id()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        ctx.ui.say(&format!("Exporting the container to {}", path.display()));
        let exported = ctx
            .driver
            .export(id, &mut out)
            .map_err(CoreError::from)
            .and_then(|()| out.flush().map_err(CoreError::from));
        if exported.is_err() {
            drop(out);
            if let Err(e) = fs::remove_file(path) {
                warn!("failed to remove partial export {}: {e}", path.display());
            }
        }
        exported
    }
}

impl Step for StepExport {
    fn name(&self) -> &'static str {
        "export"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        match Self::export(ctx, &self.path) {
            Ok(()) => {
                ctx.artifact = Some(Artifact::Export {
                    path: self.path.clone(),
                });
                StepAction::Continue
            }
            Err(e) => ctx.fail(e),
        }
    }
}
