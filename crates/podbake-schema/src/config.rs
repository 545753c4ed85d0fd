use crate::provisioner::ProvisionerSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder in `run_command` replaced by the configured image.
pub const IMAGE_TEMPLATE: &str = "{{.Image}}";

/// Directory inside the container where the host scratch dir is mounted.
pub const DEFAULT_CONTAINER_DIR: &str = "/packer-files";

const SYSTEMD_MODES: &[&str] = &["true", "false", "always"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("image must be specified")]
    ImageNotSpecified,
    #[error("no instructions given for handling the artifact; expected commit, discard, or export_path")]
    ArtifactNotUsed,
    #[error("cannot specify more than one of commit, discard, and export_path")]
    ArtifactUseConflict,
    #[error("export_path must be a file, not a directory: {0}")]
    ExportPathNotFile(String),
    #[error("invalid systemd mode '{0}', expected one of: true, false, always")]
    InvalidSystemd(String),
    #[error("[publish] requires commit = true")]
    PublishWithoutCommit,
    #[error("[login] field '{0}' must not be empty")]
    EmptyLoginField(&'static str),
    #[error("invalid provisioner #{index}: {reason}")]
    InvalidProvisioner { index: usize, reason: String },
}

/// How the container is captured once provisioning finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactMode {
    Commit,
    Export(PathBuf),
    Discard,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub image: String,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_true")]
    pub pull: bool,
    #[serde(default = "default_container_dir")]
    pub container_dir: String,
    #[serde(default = "default_run_command")]
    pub run_command: Vec<String>,
    #[serde(default)]
    pub device: Vec<String>,
    #[serde(default)]
    pub cap_add: Vec<String>,
    #[serde(default)]
    pub cap_drop: Vec<String>,
    #[serde(default)]
    pub tmpfs: Vec<String>,
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub pty: bool,
    #[serde(default)]
    pub exec_user: Option<String>,
    #[serde(default = "default_systemd")]
    pub systemd: String,
    #[serde(default = "default_true")]
    pub fix_upload_owner: bool,

    #[serde(default)]
    pub commit: bool,
    #[serde(default)]
    pub discard: bool,
    #[serde(default)]
    pub export_path: Option<PathBuf>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,

    #[serde(default)]
    pub login: Option<LoginSection>,
    #[serde(default)]
    pub publish: Option<PublishSection>,
    #[serde(default, rename = "provisioner")]
    pub provisioners: Vec<ProvisionerSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoginSection {
    pub server: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PublishSection {
    pub repository: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub push: bool,
}

fn default_engine() -> String {
    "podman".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_container_dir() -> String {
    DEFAULT_CONTAINER_DIR.to_owned()
}

fn default_run_command() -> Vec<String> {
    ["-d", "-i", "-t", "--entrypoint=/bin/sh", "--", IMAGE_TEMPLATE]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_systemd() -> String {
    "true".to_owned()
}

impl BuildConfig {
    /// Check the cross-field rules that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::ImageNotSpecified);
        }

        let exporting = self.export_path.is_some();
        let selected = [self.commit, self.discard, exporting]
            .iter()
            .filter(|b| **b)
            .count();
        if selected > 1 {
            return Err(ConfigError::ArtifactUseConflict);
        }
        if selected == 0 {
            return Err(ConfigError::ArtifactNotUsed);
        }

        if let Some(path) = &self.export_path {
            if path.is_dir() {
                return Err(ConfigError::ExportPathNotFile(path.display().to_string()));
            }
        }

        if !SYSTEMD_MODES.contains(&self.systemd.as_str()) {
            return Err(ConfigError::InvalidSystemd(self.systemd.clone()));
        }

        if self.publish.is_some() && !self.commit {
            return Err(ConfigError::PublishWithoutCommit);
        }

        if let Some(login) = &self.login {
            if login.server.trim().is_empty() {
                return Err(ConfigError::EmptyLoginField("server"));
            }
            if login.username.trim().is_empty() {
                return Err(ConfigError::EmptyLoginField("username"));
            }
            if login.password.is_empty() {
                return Err(ConfigError::EmptyLoginField("password"));
            }
        }

        for (index, provisioner) in self.provisioners.iter().enumerate() {
            provisioner
                .validate()
                .map_err(|reason| ConfigError::InvalidProvisioner { index, reason })?;
        }

        Ok(())
    }

    pub fn artifact_mode(&self) -> ArtifactMode {
        if let Some(path) = &self.export_path {
            ArtifactMode::Export(path.clone())
        } else if self.commit {
            ArtifactMode::Commit
        } else {
            ArtifactMode::Discard
        }
    }

    /// Run arguments with the image template expanded.
    pub fn rendered_run_command(&self) -> Vec<String> {
        self.run_command
            .iter()
            .map(|arg| arg.replace(IMAGE_TEMPLATE, &self.image))
            .collect()
    }
}

pub fn parse_config_str(input: &str) -> Result<BuildConfig, ConfigError> {
    let config: BuildConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<BuildConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = parse_config_str(
            r#"
image = "docker.io/library/alpine:3.20"
discard = true
"#,
        )
        .expect("should parse");
        assert_eq!(config.engine, "podman");
        assert!(config.pull);
        assert!(config.fix_upload_owner);
        assert_eq!(config.container_dir, "/packer-files");
        assert_eq!(config.systemd, "true");
        assert_eq!(config.run_command.last().unwrap(), IMAGE_TEMPLATE);
        assert_eq!(config.artifact_mode(), ArtifactMode::Discard);
    }

    #[test]
    fn parses_full_config() {
        let input = r#"
image = "fedora:40"
engine = "/usr/local/bin/podman"
pull = false
container_dir = "/build"
device = ["/dev/fuse"]
cap_add = ["SYS_ADMIN"]
cap_drop = ["NET_RAW"]
tmpfs = ["/run"]
privileged = true
pty = true
exec_user = "1000:1000"
systemd = "always"
fix_upload_owner = false
commit = true
author = "builder@example.com"
message = "provisioned"
changes = ["ENV FOO=bar", "WORKDIR /app"]

[volumes]
"/srv/cache" = "/cache"

[login]
server = "registry.example.com"
username = "ci"
password = "hunter2"

[publish]
repository = "registry.example.com/team/app"
tags = ["latest", "1.0"]
push = true

[[provisioner]]
type = "shell"
inline = ["echo hello"]

[[provisioner]]
type = "file"
source = "./app.conf"
destination = "/etc/app.conf"
"#;
        let config = parse_config_str(input).expect("should parse");
        assert!(!config.pull);
        assert_eq!(config.volumes.get("/srv/cache").unwrap(), "/cache");
        assert_eq!(config.exec_user.as_deref(), Some("1000:1000"));
        assert_eq!(config.changes.len(), 2);
        assert_eq!(config.login.as_ref().unwrap().server, "registry.example.com");
        assert_eq!(config.publish.as_ref().unwrap().tags, ["latest", "1.0"]);
        assert_eq!(config.provisioners.len(), 2);
        assert_eq!(config.artifact_mode(), ArtifactMode::Commit);
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
image = "alpine"
discard = true
unknown_field = true
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::ParseToml(_))
        ));
    }

    #[test]
    fn rejects_empty_image() {
        let input = r#"
image = "  "
discard = true
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::ImageNotSpecified)
        ));
    }

    #[test]
    fn rejects_conflicting_artifacts() {
        let input = r#"
image = "alpine"
commit = true
discard = true
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::ArtifactUseConflict)
        ));

        let input = r#"
image = "alpine"
commit = true
export_path = "out.tar"
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::ArtifactUseConflict)
        ));
    }

    #[test]
    fn rejects_missing_artifact() {
        assert!(matches!(
            parse_config_str(r#"image = "alpine""#),
            Err(ConfigError::ArtifactNotUsed)
        ));
    }

    #[test]
    fn rejects_export_path_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = format!(
            "image = \"alpine\"\nexport_path = \"{}\"\n",
            dir.path().display()
        );
        assert!(matches!(
            parse_config_str(&input),
            Err(ConfigError::ExportPathNotFile(_))
        ));
    }

    #[test]
    fn export_path_selects_export_mode() {
        let config = parse_config_str(
            r#"
image = "alpine"
export_path = "/tmp/podbake-out.tar"
"#,
        )
        .unwrap();
        assert_eq!(
            config.artifact_mode(),
            ArtifactMode::Export(PathBuf::from("/tmp/podbake-out.tar"))
        );
    }

    #[test]
    fn rejects_unknown_systemd_mode() {
        let input = r#"
image = "alpine"
discard = true
systemd = "sometimes"
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::InvalidSystemd(_))
        ));
    }

    #[test]
    fn publish_requires_commit() {
        let input = r#"
image = "alpine"
discard = true

[publish]
repository = "example/app"
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::PublishWithoutCommit)
        ));
    }

    #[test]
    fn rejects_blank_login_fields() {
        let input = r#"
image = "alpine"
discard = true

[login]
server = "registry.example.com"
username = ""
password = "secret"
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::EmptyLoginField("username"))
        ));
    }

    #[test]
    fn run_command_template_is_rendered() {
        let config = parse_config_str(
            r#"
image = "alpine:3.20"
discard = true
run_command = ["-d", "--name", "{{.Image}}-builder", "{{.Image}}"]
"#,
        )
        .unwrap();
        assert_eq!(
            config.rendered_run_command(),
            ["-d", "--name", "alpine:3.20-builder", "alpine:3.20"]
        );
    }

    #[test]
    fn parse_config_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podbake.toml");
        fs::write(&path, "image = \"alpine\"\ndiscard = true\n").unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.image, "alpine");
    }
}
