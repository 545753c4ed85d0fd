//! In-memory `Driver` and `Communicator` for tests.

use crate::communicator::Communicator;
use crate::driver::{CommitOptions, ContainerConfig, Driver};
use crate::remote::{ExitStatusCell, RemoteCommand};
use crate::RuntimeError;
use std::collections::{BTreeMap, HashMap};
use std::fs::Metadata;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct DriverState {
    calls: Vec<String>,
    failures: HashMap<String, String>,
    session: Option<String>,
}

/// Records every call as `"<op> <args...>"` and answers with canned values.
pub struct MockDriver {
    state: Mutex<DriverState>,
    container_id: String,
    version: String,
    container_user: String,
    image_id: String,
    export_data: Vec<u8>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            state: Mutex::new(DriverState::default()),
            container_id: "c1".to_owned(),
            version: "4.9.4".to_owned(),
            container_user: String::new(),
            image_id: "sha256:mock-image".to_owned(),
            export_data: b"mock export".to_vec(),
        }
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_container_id(mut self, id: &str) -> Self {
        self.container_id = id.to_owned();
        self
    }

    #[must_use]
    pub fn with_container_user(mut self, user: &str) -> Self {
        self.container_user = user.to_owned();
        self
    }

    #[must_use]
    pub fn with_image_id(mut self, id: &str) -> Self {
        self.image_id = id.to_owned();
        self
    }

    #[must_use]
    pub fn with_export_data(mut self, data: &[u8]) -> Self {
        self.export_data = data.to_vec();
        self
    }

    /// Make every later call to `op` fail with `message`.
    pub fn fail_on(&self, op: &str, message: &str) {
        locked(&self.state)
            .failures
            .insert(op.to_owned(), message.to_owned());
    }

    pub fn calls(&self) -> Vec<String> {
        locked(&self.state).calls.clone()
    }

    /// Recorded calls of one operation.
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        locked(&self.state)
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .cloned()
            .collect()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls_of(op).len()
    }

    pub fn logged_in(&self) -> Option<String> {
        locked(&self.state).session.clone()
    }

    fn record(&self, op: &str, args: &[&str]) -> Result<(), RuntimeError> {
        let mut state = locked(&self.state);
        let mut call = op.to_owned();
        for arg in args {
            call.push(' ');
            call.push_str(arg);
        }
        state.calls.push(call);
        match state.failures.get(op) {
            Some(message) => Err(RuntimeError::CommandFailed {
                command: format!("mock {op}"),
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn verify(&self) -> Result<(), RuntimeError> {
        self.record("verify", &[])
    }

    fn version(&self) -> Result<String, RuntimeError> {
        self.record("version", &[])?;
        Ok(self.version.clone())
    }

    fn start_container(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        self.record("start", &[&config.image])?;
        Ok(self.container_id.clone())
    }

    fn kill_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record("kill", &[id])
    }

    fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record("stop", &[id])
    }

    fn container_user(&self, id: &str) -> Result<String, RuntimeError> {
        self.record("user", &[id])?;
        Ok(self.container_user.clone())
    }

    fn ip_address(&self, id: &str) -> Result<String, RuntimeError> {
        self.record("ip", &[id])?;
        Ok("10.88.0.2".to_owned())
    }

    fn commit(&self, id: &str, _options: &CommitOptions) -> Result<String, RuntimeError> {
        self.record("commit", &[id])?;
        Ok(self.image_id.clone())
    }

    fn import_image(
        &self,
        path: &Path,
        _changes: &[String],
        repository: &str,
    ) -> Result<String, RuntimeError> {
        self.record("import", &[&path.to_string_lossy(), repository])?;
        Ok(self.image_id.clone())
    }

    fn export(&self, id: &str, dst: &mut dyn Write) -> Result<(), RuntimeError> {
        self.record("export", &[id])?;
        dst.write_all(&self.export_data)?;
        Ok(())
    }

    fn save_image(&self, id: &str, dst: &mut dyn Write) -> Result<(), RuntimeError> {
        self.record("save", &[id])?;
        dst.write_all(&self.export_data)?;
        Ok(())
    }

    fn image_digest(&self, id: &str) -> Result<String, RuntimeError> {
        self.record("digest", &[id])?;
        Ok(format!("{}-digest", self.image_id))
    }

    fn tag_image(&self, id: &str, reference: &str) -> Result<(), RuntimeError> {
        self.record("tag", &[id, reference])
    }

    fn push(&self, reference: &str) -> Result<(), RuntimeError> {
        self.record("push", &[reference])
    }

    fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        self.record("pull", &[image])
    }

    fn delete_image(&self, id: &str) -> Result<(), RuntimeError> {
        self.record("rmi", &[id])
    }

    fn login(&self, server: &str, username: &str, _password: &str) -> Result<(), RuntimeError> {
        self.record("login", &[server, username])?;
        locked(&self.state).session = Some(server.to_owned());
        Ok(())
    }

    fn logout(&self, server: &str) -> Result<(), RuntimeError> {
        self.record("logout", &[server])?;
        let mut state = locked(&self.state);
        if state.session.as_deref() != Some(server) {
            return Err(RuntimeError::NotLoggedIn(server.to_owned()));
        }
        state.session = None;
        Ok(())
    }
}

#[derive(Default)]
struct CommunicatorState {
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<String>,
    responses: HashMap<String, (i32, String)>,
    dir_uploads: Vec<(String, String)>,
}

/// Runs nothing: commands are recorded and answered from scripted
/// responses, files live in a map keyed by container path.
#[derive(Default)]
pub struct MockCommunicator {
    state: Mutex<CommunicatorState>,
}

impl MockCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `status`, writing `stdout` to its sink.
    pub fn respond(&self, command: &str, status: i32, stdout: &str) {
        locked(&self.state)
            .responses
            .insert(command.to_owned(), (status, stdout.to_owned()));
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        locked(&self.state)
            .files
            .insert(path.to_owned(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        locked(&self.state).files.get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        locked(&self.state).commands.clone()
    }

    /// `(src, dst)` pairs passed to `upload_dir`.
    pub fn dir_uploads(&self) -> Vec<(String, String)> {
        locked(&self.state).dir_uploads.clone()
    }
}

impl Communicator for MockCommunicator {
    fn start(&self, mut remote: RemoteCommand) -> Result<ExitStatusCell, RuntimeError> {
        let (status, stdout) = {
            let mut state = locked(&self.state);
            state.commands.push(remote.command.clone());
            state
                .responses
                .get(&remote.command)
                .cloned()
                .unwrap_or_default()
        };
        if let Some(mut input) = remote.stdin.take() {
            std::io::copy(&mut input, &mut std::io::sink())?;
        }
        if let Some(sink) = remote.stdout.as_mut() {
            sink.write_all(stdout.as_bytes())?;
            sink.flush()?;
        }
        let exit = remote.exit_cell();
        remote.set_exited(status);
        Ok(exit)
    }

    fn upload(
        &self,
        dst: &str,
        src: &mut dyn Read,
        _metadata: Option<&Metadata>,
    ) -> Result<(), RuntimeError> {
        let mut data = Vec::new();
        src.read_to_end(&mut data)?;
        locked(&self.state).files.insert(dst.to_owned(), data);
        Ok(())
    }

    fn upload_dir(&self, dst: &str, src: &str, _exclude: &[String]) -> Result<(), RuntimeError> {
        locked(&self.state)
            .dir_uploads
            .push((src.to_owned(), dst.to_owned()));
        Ok(())
    }

    fn download(&self, src: &str, dst: &mut dyn Write) -> Result<(), RuntimeError> {
        let data = self
            .file(src)
            .ok_or_else(|| RuntimeError::RemoteDiagnostic {
                path: src.to_owned(),
                diagnostic: format!("no such file or directory: {src}"),
            })?;
        dst.write_all(&data)?;
        Ok(())
    }

    fn download_dir(
        &self,
        _src: &str,
        _dst: &Path,
        _exclude: &[String],
    ) -> Result<(), RuntimeError> {
        Err(RuntimeError::Unsupported("download_dir".to_owned()))
    }
}
