//! Build configuration for podbake.
//!
//! This crate defines the schema layer: TOML parsing of the build file
//! (`BuildConfig`), the defaults the engine expects when a key is omitted,
//! validation of mutually exclusive artifact options, and the provisioner
//! declarations consumed by the core pipeline.

pub mod config;
pub mod provisioner;

pub use config::{
    parse_config_file, parse_config_str, ArtifactMode, BuildConfig, ConfigError, LoginSection,
    PublishSection, DEFAULT_CONTAINER_DIR, IMAGE_TEMPLATE,
};
pub use provisioner::{FileDirection, FileProvisioner, ProvisionerSpec, ShellProvisioner};
