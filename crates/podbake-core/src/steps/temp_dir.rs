use crate::context::BuildContext;
use crate::pipeline::{Step, StepAction};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Creates the host scratch dir that is mounted into the container.
#[derive(Debug, Default)]
pub struct StepTempDir {
    /// Parent of the scratch dir; the system temp dir when unset.
    root: Option<PathBuf>,
    dir: Option<TempDir>,
}

impl StepTempDir {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root, dir: None }
    }
}

impl Step for StepTempDir {
    fn name(&self) -> &'static str {
        "temp_dir"
    }

    fn run(&mut self, ctx: &mut BuildContext) -> StepAction {
        ctx.ui.say("Creating a temporary directory for sharing data...");
        let mut builder = tempfile::Builder::new();
        builder.prefix("podbake");
        let created = match &self.root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        match created {
            Ok(dir) => {
                debug!("scratch dir {}", dir.path().display());
                ctx.temp_dir = Some(dir.path().to_path_buf());
                self.dir = Some(dir);
                StepAction::Continue
            }
            Err(e) => ctx.fail(e),
        }
    }

    fn cleanup(&mut self, ctx: &mut BuildContext) {
        ctx.temp_dir = None;
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("failed to remove scratch dir {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MemoryUi;
    use podbake_runtime::mock::MockDriver;
    use podbake_schema::parse_config_str;
    use std::sync::Arc;

    fn context() -> BuildContext {
        let config = parse_config_str("image = \"alpine\"\ndiscard = true\n").unwrap();
        BuildContext::new(
            Arc::new(MockDriver::new()),
            Arc::new(MemoryUi::new()),
            Arc::new(config),
        )
    }

    #[test]
    fn cleanup_without_run_is_a_noop() {
        let mut ctx = context();
        StepTempDir::new(None).cleanup(&mut ctx);
        assert_eq!(ctx.temp_dir, None);
    }

    #[test]
    fn repeated_cleanup_removes_the_dir_once() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = context();
        let mut step = StepTempDir::new(Some(root.path().to_path_buf()));

        assert_eq!(step.run(&mut ctx), StepAction::Continue);
        let scratch = ctx.temp_dir.clone().unwrap();
        assert!(scratch.is_dir());
        assert!(scratch.starts_with(root.path()));

        step.cleanup(&mut ctx);
        step.cleanup(&mut ctx);
        assert!(!scratch.exists());
        assert_eq!(ctx.temp_dir, None);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
