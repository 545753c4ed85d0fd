use super::{json_pretty, load_config, EXIT_SUCCESS};
use std::path::Path;

const REDACTED: &str = "********";

pub fn run(config_path: &Path) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let mut value = serde_json::to_value(&config)
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    if let Some(password) = value.pointer_mut("/login/password") {
        *password = serde_json::Value::String(REDACTED.to_owned());
    }
    println!("{}", json_pretty(&value)?);
    Ok(EXIT_SUCCESS)
}
