use crate::RuntimeError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Launch request for the build container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    pub image: String,
    /// Arguments after `run`; `{{.Image}}` has already been expanded.
    pub run_command: Vec<String>,
    pub device: Vec<String>,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    /// Host path to container path.
    pub volumes: BTreeMap<String, String>,
    pub tmpfs: Vec<String>,
    pub privileged: bool,
    pub systemd: String,
}

impl ContainerConfig {
    /// Full argument list for the engine's `run` sub-command. Option flags
    /// precede the configured run command, which ends with the image.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_owned()];
        for device in &self.device {
            args.push("--device".to_owned());
            args.push(device.clone());
        }
        for cap in &self.cap_add {
            args.push("--cap-add".to_owned());
            args.push(cap.clone());
        }
        for cap in &self.cap_drop {
            args.push("--cap-drop".to_owned());
            args.push(cap.clone());
        }
        for (host, container) in &self.volumes {
            args.push("-v".to_owned());
            args.push(format!("{host}:{container}"));
        }
        for mount in &self.tmpfs {
            args.push("--tmpfs".to_owned());
            args.push(mount.clone());
        }
        if self.privileged {
            args.push("--privileged".to_owned());
        }
        if !self.systemd.is_empty() {
            args.push(format!("--systemd={}", self.systemd));
        }
        args.extend(self.run_command.iter().cloned());
        args
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    pub author: Option<String>,
    pub message: Option<String>,
    pub changes: Vec<String>,
}

/// Command surface of the container engine.
///
/// Every operation is one engine invocation; implementations keep no state
/// beyond login bookkeeping, which lets steps be tested against a mock.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Check that the engine can be executed at all.
    fn verify(&self) -> Result<(), RuntimeError>;

    fn version(&self) -> Result<String, RuntimeError>;

    /// Start a container and return its id.
    fn start_container(&self, config: &ContainerConfig) -> Result<String, RuntimeError>;

    /// Forcibly stop a container.
    fn kill_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Gently stop a container.
    fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// The user configured in the container's image, empty when unset.
    fn container_user(&self, id: &str) -> Result<String, RuntimeError>;

    /// Address of the container on the engine's network, empty when it has
    /// none.
    fn ip_address(&self, id: &str) -> Result<String, RuntimeError>;

    /// Commit the container to a new image and return the image id.
    fn commit(&self, id: &str, options: &CommitOptions) -> Result<String, RuntimeError>;

    /// Import a filesystem tarball as an image tagged `repository`, applying
    /// Dockerfile-style `changes`, and return the image id.
    fn import_image(
        &self,
        path: &Path,
        changes: &[String],
        repository: &str,
    ) -> Result<String, RuntimeError>;

    /// Stream the container filesystem as a tar archive.
    fn export(&self, id: &str, dst: &mut dyn Write) -> Result<(), RuntimeError>;

    /// Stream an image as a tar archive.
    fn save_image(&self, id: &str, dst: &mut dyn Write) -> Result<(), RuntimeError>;

    /// Content digest of an image.
    fn image_digest(&self, id: &str) -> Result<String, RuntimeError>;

    fn tag_image(&self, id: &str, reference: &str) -> Result<(), RuntimeError>;

    fn push(&self, reference: &str) -> Result<(), RuntimeError>;

    fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    fn delete_image(&self, id: &str) -> Result<(), RuntimeError>;

    /// Log in to a registry. Callers must pair a successful login with
    /// exactly one `logout` for the same server.
    fn login(&self, server: &str, username: &str, password: &str) -> Result<(), RuntimeError>;

    /// Log out of a registry; only valid after a successful `login`.
    fn logout(&self, server: &str) -> Result<(), RuntimeError>;
}
