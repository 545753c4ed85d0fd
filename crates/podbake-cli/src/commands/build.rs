use super::{json_pretty, load_config, CONFIG_ERROR_PREFIX, EXIT_SUCCESS};
use crate::console_ui::ConsoleUi;
use console::Style;
use podbake_core::{install_signal_handler, Builder, CancelToken, CoreError};
use podbake_runtime::{check_engine_prereqs, format_missing, PodmanDriver};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub fn run(
    config_path: &Path,
    temp_root: Option<&Path>,
    skip_prereqs: bool,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;

    debug!(
        "loaded {} with {} provisioner(s)",
        config_path.display(),
        config.provisioners.len()
    );

    let engine = Path::new(&config.engine);
    if skip_prereqs {
        debug!("skipping prerequisite check for {}", engine.display());
    } else {
        let missing = check_engine_prereqs(engine);
        if !missing.is_empty() {
            return Err(format_missing(&missing));
        }
    }

    let cancel = CancelToken::new();
    install_signal_handler(&cancel);

    let driver = Arc::new(PodmanDriver::new(engine));
    let mut builder =
        Builder::new(config, driver, Arc::new(ConsoleUi::default())).with_cancel(cancel);
    if let Some(root) = temp_root {
        builder = builder.with_temp_root(root);
    }

    let artifact = builder.build().map_err(|e| match e {
        CoreError::Config(e) => format!("{CONFIG_ERROR_PREFIX} {e}"),
        other => format!("build failed: {other}"),
    })?;

    if json {
        let payload = serde_json::json!({
            "status": "built",
            "artifact": artifact,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{} {artifact}", Style::new().green().apply_to("✓"));
    }
    Ok(EXIT_SUCCESS)
}
