pub mod build;
pub mod inspect_config;
pub mod validate;

use podbake_schema::{parse_config_file, ArtifactMode, BuildConfig};
use std::path::Path;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Error messages starting with this map to `EXIT_CONFIG_ERROR`.
pub const CONFIG_ERROR_PREFIX: &str = "configuration error:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn load_config(path: &Path) -> Result<BuildConfig, String> {
    parse_config_file(path).map_err(|e| format!("{CONFIG_ERROR_PREFIX} {}: {e}", path.display()))
}

pub fn artifact_mode_label(mode: &ArtifactMode) -> String {
    match mode {
        ArtifactMode::Commit => "commit".to_owned(),
        ArtifactMode::Export(path) => format!("export to {}", path.display()),
        ArtifactMode::Discard => "discard".to_owned(),
    }
}
