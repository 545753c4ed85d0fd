use crate::driver::{CommitOptions, ContainerConfig, Driver};
use crate::process::{
    check_output, collect_pipe, describe, run_engine, spawn_error, spawn_pipe_reader,
    stdout_trimmed,
};
use crate::RuntimeError;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// `Driver` backed by the podman command line (or any CLI-compatible engine).
pub struct PodmanDriver {
    engine: PathBuf,
    /// Registry of the current login session.
    session: Mutex<Option<String>>,
}

impl Default for PodmanDriver {
    fn default() -> Self {
        Self::new("podman")
    }
}

impl PodmanDriver {
    pub fn new(engine: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            session: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Path {
        &self.engine
    }

    fn run(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
        let output = run_engine(&self.engine, &args)?;
        Ok(stdout_trimmed(&output))
    }

    /// Run the engine with stdout streamed into `dst`.
    fn stream_to(&self, args: &[&str], dst: &mut dyn Write) -> Result<(), RuntimeError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
        debug!("streaming {}", describe(&self.engine, &args));
        let mut child = Command::new(&self.engine)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.engine, &e))?;

        let stderr_reader = spawn_pipe_reader(child.stderr.take());
        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, dst),
            None => Ok(0),
        };
        if copied.is_err() {
            let _ = child.kill();
        }
        let status = child.wait()?;
        let stderr = collect_pipe(stderr_reader);

        if !status.success() {
            return Err(RuntimeError::CommandFailed {
                command: describe(&self.engine, &args),
                stderr: if stderr.is_empty() {
                    status.to_string()
                } else {
                    stderr
                },
            });
        }
        let copied = copied?;
        debug!("copied {copied} bytes from {}", describe(&self.engine, &args));
        Ok(())
    }

    /// Run the engine and take the last line of its stdout as the id of
    /// what it created. Progress output may precede the id.
    fn run_for_id(&self, args: &[String], what: &str) -> Result<String, RuntimeError> {
        let output = run_engine(&self.engine, args)?;
        let stdout = stdout_trimmed(&output);
        let id = stdout.lines().last().unwrap_or_default().trim().to_owned();
        if id.is_empty() {
            return Err(RuntimeError::CommandFailed {
                command: describe(&self.engine, args),
                stderr: format!("engine did not report {what}"),
            });
        }
        Ok(id)
    }

    fn session(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for PodmanDriver {
    fn name(&self) -> &str {
        "podman"
    }

    fn verify(&self) -> Result<(), RuntimeError> {
        self.run(&["--version"]).map(|_| ())
    }

    fn version(&self) -> Result<String, RuntimeError> {
        self.run(&["version", "--format", "{{.Client.Version}}"])
    }

    fn start_container(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        info!("starting container from {}", config.image);
        self.run_for_id(&config.run_args(), "a container id")
    }

    fn kill_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.run(&["kill", id]).map(|_| ())
    }

    fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.run(&["stop", id]).map(|_| ())
    }

    fn container_user(&self, id: &str) -> Result<String, RuntimeError> {
        self.run(&["inspect", "--format", "{{.Config.User}}", id])
    }

    fn ip_address(&self, id: &str) -> Result<String, RuntimeError> {
        self.run(&["inspect", "--format", "{{.NetworkSettings.IPAddress}}", id])
    }

    fn commit(&self, id: &str, options: &CommitOptions) -> Result<String, RuntimeError> {
        let mut args = vec!["commit".to_owned()];
        if let Some(author) = &options.author {
            args.push("--author".to_owned());
            args.push(author.clone());
        }
        for change in &options.changes {
            args.push("--change".to_owned());
            args.push(change.clone());
        }
        if let Some(message) = &options.message {
            args.push("--message".to_owned());
            args.push(message.clone());
        }
        args.push(id.to_owned());
        self.run_for_id(&args, "an image id")
    }

    fn import_image(
        &self,
        path: &Path,
        changes: &[String],
        repository: &str,
    ) -> Result<String, RuntimeError> {
        let mut args = vec!["import".to_owned()];
        for change in changes {
            args.push("--change".to_owned());
            args.push(change.clone());
        }
        args.push(path.to_string_lossy().into_owned());
        args.push(repository.to_owned());
        info!("importing {} as {repository}", path.display());
        self.run_for_id(&args, "an image id")
    }

    fn export(&self, id: &str, dst: &mut dyn Write) -> Result<(), RuntimeError> {
        self.stream_to(&["export", id], dst)
    }

    fn save_image(&self, id: &str, dst: &mut dyn Write) -> Result<(), RuntimeError> {
        self.stream_to(&["save", id], dst)
    }

    fn image_digest(&self, id: &str) -> Result<String, RuntimeError> {
        self.run(&["inspect", "--format", "{{.Digest}}", id])
    }

    fn tag_image(&self, id: &str, reference: &str) -> Result<(), RuntimeError> {
        self.run(&["tag", id, reference]).map(|_| ())
    }

    fn push(&self, reference: &str) -> Result<(), RuntimeError> {
        self.run(&["push", reference]).map(|_| ())
    }

    fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        self.run(&["pull", image]).map(|_| ())
    }

    fn delete_image(&self, id: &str) -> Result<(), RuntimeError> {
        self.run(&["rmi", id]).map(|_| ())
    }

    fn login(&self, server: &str, username: &str, password: &str) -> Result<(), RuntimeError> {
        let args: Vec<String> = ["login", "--username", username, "--password-stdin", server]
            .iter()
            .map(|a| (*a).to_owned())
            .collect();
        debug!("running {}", describe(&self.engine, &args));
        let mut child = Command::new(&self.engine)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.engine, &e))?;
        if let Some(mut stdin) = child.stdin.take() {
            // A failed write surfaces as the engine's own login error below.
            let _ = writeln!(stdin, "{password}");
        }
        let output = child.wait_with_output()?;
        check_output(&self.engine, &args, output)?;
        *self.session() = Some(server.to_owned());
        Ok(())
    }

    fn logout(&self, server: &str) -> Result<(), RuntimeError> {
        let mut session = self.session();
        if session.as_deref() != Some(server) {
            return Err(RuntimeError::NotLoggedIn(server.to_owned()));
        }
        *session = None;
        drop(session);
        self.run(&["logout", server]).map(|_| ())
    }
}
