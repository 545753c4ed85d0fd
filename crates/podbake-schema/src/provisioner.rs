use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A provisioner declared with `[[provisioner]]` in the build file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProvisionerSpec {
    Shell(ShellProvisioner),
    File(FileProvisioner),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ShellProvisioner {
    pub inline: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default = "default_exit_codes")]
    pub valid_exit_codes: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileDirection {
    #[default]
    Upload,
    Download,
}

/// Copies between the host and the container. `source` is always the host
/// path and `destination` the container path; `direction` picks which way
/// the bytes flow.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileProvisioner {
    pub source: PathBuf,
    pub destination: String,
    #[serde(default)]
    pub direction: FileDirection,
    /// Accepted for compatibility; directory copies are not filtered.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_exit_codes() -> Vec<i32> {
    vec![0]
}

fn is_env_name(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl ProvisionerSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionerSpec::Shell(_) => "shell",
            ProvisionerSpec::File(_) => "file",
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            ProvisionerSpec::Shell(shell) => {
                if shell.inline.is_empty() {
                    return Err("shell provisioner needs at least one inline command".to_owned());
                }
                if let Some(key) = shell.environment.keys().find(|k| !is_env_name(k)) {
                    return Err(format!("invalid environment variable name '{key}'"));
                }
                if shell.valid_exit_codes.is_empty() {
                    return Err("valid_exit_codes must not be empty".to_owned());
                }
                Ok(())
            }
            ProvisionerSpec::File(file) => {
                if file.source.as_os_str().is_empty() {
                    return Err("file provisioner source must not be empty".to_owned());
                }
                if file.destination.trim().is_empty() {
                    return Err("file provisioner destination must not be empty".to_owned());
                }
                Ok(())
            }
        }
    }
}
