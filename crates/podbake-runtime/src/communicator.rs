//! Remote commands and file transfer against the running build container.
//!
//! Every operation takes the communicator lock for its whole duration, so a
//! command never overlaps an upload and command N+1 is not spawned before
//! command N has published its exit status.

use crate::archive::{copy_first_entry, write_single_entry, EntryError};
use crate::process::{collect_pipe, describe, exit_code, run_engine, spawn_pipe_reader};
use crate::remote::{ExitStatusCell, RemoteCommand};
use crate::{RuntimeError, TransferStage, SPAWN_FAILURE_STATUS};
use std::fs::Metadata;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, warn};

/// What the provisioning layer needs from a connection to the container.
pub trait Communicator: Send + Sync {
    /// Launch `remote` and return its exit cell without waiting for it.
    fn start(&self, remote: RemoteCommand) -> Result<ExitStatusCell, RuntimeError>;

    /// Copy `src` to the file `dst` in the container. Without `metadata` the
    /// stream is spooled to the host scratch dir first to learn its size.
    fn upload(
        &self,
        dst: &str,
        src: &mut dyn Read,
        metadata: Option<&Metadata>,
    ) -> Result<(), RuntimeError>;

    /// Copy the host directory `src` to `dst`. A trailing `/` on `src` copies
    /// its contents rather than the directory itself. `exclude` is not
    /// applied.
    fn upload_dir(&self, dst: &str, src: &str, exclude: &[String]) -> Result<(), RuntimeError>;

    /// Copy the single file `src` from the container into `dst`.
    fn download(&self, src: &str, dst: &mut dyn Write) -> Result<(), RuntimeError>;

    fn download_dir(&self, src: &str, dst: &Path, exclude: &[String])
        -> Result<(), RuntimeError>;
}

/// Binding of a communicator to one container.
#[derive(Debug, Clone)]
pub struct CommunicatorSettings {
    pub engine: PathBuf,
    pub container_id: String,
    /// Host scratch dir, mounted at `container_dir`.
    pub host_dir: PathBuf,
    pub container_dir: String,
    pub version: String,
    /// User configured in the image; owner of uploaded files.
    pub container_user: String,
    pub exec_user: Option<String>,
    pub pty: bool,
    pub fix_upload_owner: bool,
    pub entry_point: Vec<String>,
}

impl CommunicatorSettings {
    pub fn new(
        engine: impl Into<PathBuf>,
        container_id: impl Into<String>,
        host_dir: impl Into<PathBuf>,
        container_dir: impl Into<String>,
    ) -> Self {
        Self {
            engine: engine.into(),
            container_id: container_id.into(),
            host_dir: host_dir.into(),
            container_dir: container_dir.into(),
            version: String::new(),
            container_user: String::new(),
            exec_user: None,
            pty: false,
            fix_upload_owner: true,
            entry_point: vec!["/bin/sh".to_owned(), "-c".to_owned()],
        }
    }
}

struct Inner {
    settings: CommunicatorSettings,
    lock: Mutex<()>,
}

/// `Communicator` that drives the engine's `exec` and `cp` sub-commands.
///
/// Clones share the same lock and settings.
#[derive(Clone)]
pub struct PodmanCommunicator {
    inner: Arc<Inner>,
}

impl PodmanCommunicator {
    pub fn new(settings: CommunicatorSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn settings(&self) -> &CommunicatorSettings {
        &self.inner.settings
    }

    /// Engine arguments that run `command` through the entry point.
    pub fn exec_args(&self, command: &str) -> Vec<String> {
        let settings = &self.inner.settings;
        let mut args = vec!["exec".to_owned(), "-i".to_owned()];
        if let Some(user) = settings.exec_user.as_deref().filter(|u| !u.is_empty()) {
            args.push("-u".to_owned());
            args.push(user.to_owned());
        }
        if settings.pty {
            args.push("-t".to_owned());
        }
        args.push(settings.container_id.clone());
        args.extend(settings.entry_point.iter().cloned());
        args.push(format!("({command})"));
        args
    }
}

impl std::fmt::Debug for PodmanCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodmanCommunicator")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engine(&self) -> &Path {
        &self.settings.engine
    }

    /// Body of the background thread behind `start`.
    fn run_remote(&self, args: Vec<String>, mut remote: RemoteCommand) {
        let _guard = self.lock();
        debug!("executing {}", describe(self.engine(), &args));

        let mut child = match Command::new(self.engine())
            .args(&args)
            .stdin(piped_if(remote.stdin.is_some()))
            .stdout(piped_if(remote.stdout.is_some()))
            .stderr(piped_if(remote.stderr.is_some()))
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to start {}: {e}", describe(self.engine(), &args));
                remote.set_exited(SPAWN_FAILURE_STATUS);
                return;
            }
        };

        if let (Some(mut input), Some(mut pipe)) = (remote.stdin.take(), child.stdin.take()) {
            let spawned = thread::Builder::new()
                .name("podbake-stdin".to_owned())
                .spawn(move || {
                    if let Err(e) = io::copy(&mut input, &mut pipe) {
                        debug!("stdin copy ended early: {e}");
                    }
                });
            if let Err(e) = spawned {
                warn!("failed to start stdin copier: {e}");
            }
        }

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout_sink = remote.stdout.take();
        let mut stderr_sink = remote.stderr.take();
        thread::scope(|scope| {
            if let (Some(mut pipe), Some(sink)) = (stdout_pipe, stdout_sink.as_mut()) {
                let spawned = thread::Builder::new()
                    .name("podbake-stdout".to_owned())
                    .spawn_scoped(scope, move || drain(&mut pipe, sink.as_mut(), "stdout"));
                if let Err(e) = spawned {
                    warn!("failed to start stdout reader: {e}");
                }
            }
            if let (Some(mut pipe), Some(sink)) = (stderr_pipe, stderr_sink.as_mut()) {
                let spawned = thread::Builder::new()
                    .name("podbake-stderr".to_owned())
                    .spawn_scoped(scope, move || drain(&mut pipe, sink.as_mut(), "stderr"));
                if let Err(e) = spawned {
                    warn!("failed to start stderr reader: {e}");
                }
            }
        });
        drop(stdout_sink);
        drop(stderr_sink);

        let status = match child.wait() {
            Ok(status) => exit_code(status),
            Err(e) => {
                warn!("failed to wait for {}: {e}", describe(self.engine(), &args));
                1
            }
        };
        debug!("remote command exited with status {status}");
        remote.set_exited(status);
    }

    fn upload_file(
        &self,
        dst: &str,
        body: &mut dyn Read,
        metadata: &Metadata,
    ) -> Result<(), RuntimeError> {
        let args = vec![
            "cp".to_owned(),
            "-".to_owned(),
            format!("{}:{}", self.settings.container_id, parent_dir(dst)),
        ];
        debug!("uploading {dst} via {}", describe(self.engine(), &args));
        let mut child = Command::new(self.engine())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RuntimeError::transfer(
                    TransferStage::PipeSetup,
                    dst,
                    format!("failed to start {}: {e}", self.engine().display()),
                )
            })?;

        let stderr_reader = spawn_pipe_reader(child.stderr.take());
        let written = match child.stdin.take() {
            Some(mut stdin) => write_single_entry(&mut stdin, base_name(dst), metadata, body, dst),
            None => Err(RuntimeError::transfer(
                TransferStage::PipeSetup,
                dst,
                "engine stdin was not captured",
            )),
        };
        let status = child.wait();
        let stderr = collect_pipe(stderr_reader);

        let bytes = written?;
        let status = status.map_err(|e| {
            RuntimeError::transfer(
                TransferStage::StreamClose,
                dst,
                format!("failed to wait for upload: {e}"),
            )
        })?;
        if !status.success() {
            return Err(RuntimeError::RemoteDiagnostic {
                path: dst.to_owned(),
                diagnostic: if stderr.is_empty() {
                    status.to_string()
                } else {
                    stderr
                },
            });
        }
        debug!("uploaded {bytes} bytes to {dst}");
        Ok(())
    }

    fn fix_destination_owner(&self, dst: &str) -> Result<(), RuntimeError> {
        if !self.settings.fix_upload_owner {
            return Ok(());
        }
        let owner = if self.settings.container_user.is_empty() {
            "root"
        } else {
            self.settings.container_user.as_str()
        };
        let mut args = vec![
            "exec".to_owned(),
            "--user".to_owned(),
            "root".to_owned(),
            self.settings.container_id.clone(),
        ];
        args.extend(self.settings.entry_point.iter().cloned());
        args.push(format!("chown -R {} {}", shell_quote(owner), shell_quote(dst)));
        run_engine(self.engine(), &args)
            .map(|_| ())
            .map_err(|e| RuntimeError::transfer(TransferStage::OwnerFix, dst, e.to_string()))
    }
}

impl Communicator for PodmanCommunicator {
    fn start(&self, remote: RemoteCommand) -> Result<ExitStatusCell, RuntimeError> {
        let args = self.exec_args(&remote.command);
        let exit = remote.exit_cell();
        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name("podbake-exec".to_owned())
            .spawn(move || inner.run_remote(args, remote))
            .map_err(|e| RuntimeError::Launch(e.to_string()))?;
        Ok(exit)
    }

    fn upload(
        &self,
        dst: &str,
        src: &mut dyn Read,
        metadata: Option<&Metadata>,
    ) -> Result<(), RuntimeError> {
        let _guard = self.inner.lock();
        if let Some(metadata) = metadata {
            self.inner.upload_file(dst, src, metadata)?;
        } else {
            let spool_error = |e: io::Error| {
                RuntimeError::transfer(TransferStage::TempFile, dst, e.to_string())
            };
            let mut spool = tempfile::Builder::new()
                .prefix("upload")
                .tempfile_in(&self.inner.settings.host_dir)
                .map_err(spool_error)?;
            io::copy(src, spool.as_file_mut()).map_err(spool_error)?;
            spool
                .as_file_mut()
                .seek(SeekFrom::Start(0))
                .map_err(spool_error)?;
            let metadata = spool.as_file().metadata().map_err(spool_error)?;
            self.inner
                .upload_file(dst, spool.as_file_mut(), &metadata)?;
        }
        self.inner.fix_destination_owner(dst)
    }

    fn upload_dir(&self, dst: &str, src: &str, exclude: &[String]) -> Result<(), RuntimeError> {
        let _guard = self.inner.lock();
        if !exclude.is_empty() {
            debug!("exclude patterns are not applied to directory uploads: {exclude:?}");
        }
        let mut source = src.to_owned();
        if source.ends_with('/') {
            source.push('.');
        }
        let args = vec![
            "cp".to_owned(),
            source,
            format!("{}:{dst}", self.inner.settings.container_id),
        ];
        run_engine(self.inner.engine(), &args).map_err(|e| match e {
            RuntimeError::CommandFailed { stderr, .. } => RuntimeError::RemoteDiagnostic {
                path: dst.to_owned(),
                diagnostic: stderr,
            },
            other => other,
        })?;
        self.inner.fix_destination_owner(dst)
    }

    fn download(&self, src: &str, dst: &mut dyn Write) -> Result<(), RuntimeError> {
        let _guard = self.inner.lock();
        let args = vec![
            "cp".to_owned(),
            format!("{}:{src}", self.inner.settings.container_id),
            "-".to_owned(),
        ];
        debug!("downloading {src} via {}", describe(self.inner.engine(), &args));
        let mut child = Command::new(self.inner.engine())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RuntimeError::transfer(
                    TransferStage::PipeSetup,
                    src,
                    format!("failed to start {}: {e}", self.inner.engine().display()),
                )
            })?;
        let stderr_reader = spawn_pipe_reader(child.stderr.take());

        let copied = match child.stdout.take() {
            Some(stdout) => {
                let mut archive = tar::Archive::new(stdout);
                let copied = copy_first_entry(&mut archive, dst);
                // The engine blocks until its stdout is consumed.
                let mut rest = archive.into_inner();
                if let Err(e) = io::copy(&mut rest, &mut io::sink()) {
                    debug!("failed to drain archive for {src}: {e}");
                }
                copied
            }
            None => Err(EntryError::Missing("engine stdout was not captured".to_owned())),
        };
        let status = child.wait();
        let stderr = collect_pipe(stderr_reader);

        match copied {
            Ok(bytes) => debug!("downloaded {bytes} bytes from {src}"),
            Err(EntryError::Missing(reason)) => {
                if !stderr.is_empty() {
                    return Err(RuntimeError::RemoteDiagnostic {
                        path: src.to_owned(),
                        diagnostic: stderr,
                    });
                }
                return Err(RuntimeError::transfer(
                    TransferStage::ArchiveRead,
                    src,
                    format!("failed to read header from tar stream: {reason}"),
                ));
            }
            Err(EntryError::Directory(name)) => {
                return Err(RuntimeError::Unsupported(format!(
                    "downloading directory '{name}' as a file"
                )));
            }
            Err(EntryError::Copy(e)) => {
                return Err(RuntimeError::transfer(
                    TransferStage::BodyCopy,
                    src,
                    format!("failed to copy download: {e}"),
                ));
            }
        }

        let status = status.map_err(|e| {
            RuntimeError::transfer(
                TransferStage::StreamClose,
                src,
                format!("failed to wait for download: {e}"),
            )
        })?;
        if !status.success() {
            return Err(RuntimeError::RemoteDiagnostic {
                path: src.to_owned(),
                diagnostic: if stderr.is_empty() {
                    status.to_string()
                } else {
                    stderr
                },
            });
        }
        dst.flush().map_err(|e| {
            RuntimeError::transfer(TransferStage::StreamClose, src, e.to_string())
        })
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

fn piped_if(requested: bool) -> Stdio {
    if requested {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

/// Copy a child's output pipe into a caller sink. A failing sink does not
/// stop the drain, or the child would block on a full pipe.
fn drain(pipe: &mut dyn Read, sink: &mut dyn Write, stream: &str) {
    if let Err(e) = io::copy(pipe, sink) {
        debug!("{stream} sink failed: {e}");
        let _ = io::copy(pipe, &mut io::sink());
    }
    if let Err(e) = sink.flush() {
        debug!("{stream} flush failed: {e}");
    }
}

/// POSIX single-quoting for interpolation into `/bin/sh -c`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Last element of a container path, ignoring trailing slashes.
fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Everything but the last element of a container path.
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        None => ".",
        Some(index) => {
            let parent = path[..index].trim_end_matches('/');
            if parent.is_empty() {
                "/"
            } else {
                parent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn communicator(exec_user: Option<&str>, pty: bool) -> PodmanCommunicator {
        let mut settings = CommunicatorSettings::new("podman", "c1", "/tmp/x", "/packer-files");
        settings.exec_user = exec_user.map(str::to_owned);
        settings.pty = pty;
        PodmanCommunicator::new(settings)
    }

    #[test]
    fn exec_args_minimal() {
        assert_eq!(
            communicator(None, false).exec_args("echo hi"),
            ["exec", "-i", "c1", "/bin/sh", "-c", "(echo hi)"]
        );
    }

    #[test]
    fn exec_args_user_precedes_tty() {
        assert_eq!(
            communicator(Some("builder"), true).exec_args("id"),
            ["exec", "-i", "-u", "builder", "-t", "c1", "/bin/sh", "-c", "(id)"]
        );
    }

    #[test]
    fn empty_exec_user_is_ignored() {
        assert_eq!(
            communicator(Some(""), false).exec_args("true"),
            ["exec", "-i", "c1", "/bin/sh", "-c", "(true)"]
        );
    }

    #[test]
    fn path_helpers_follow_unix_rules() {
        assert_eq!(parent_dir("/etc/motd"), "/etc");
        assert_eq!(parent_dir("/motd"), "/");
        assert_eq!(parent_dir("motd"), ".");
        assert_eq!(parent_dir("/a//b"), "/a");
        assert_eq!(base_name("/etc/motd"), "motd");
        assert_eq!(base_name("/etc/conf.d/"), "conf.d");
        assert_eq!(base_name("/"), "/");
        assert_eq!(base_name(""), ".");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("root"), "'root'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("$(whoami)"), "'$(whoami)'");
    }

    #[test]
    fn download_dir_is_unsupported() {
        let err = communicator(None, false)
            .download_dir("/etc", Path::new("/tmp/etc"), &[])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Unsupported(_)));
    }

    #[test]
    fn missing_engine_publishes_spawn_failure_status() {
        let settings =
            CommunicatorSettings::new("/nonexistent/podman", "c1", "/tmp", "/packer-files");
        let comm = PodmanCommunicator::new(settings);
        let exit = comm.start(RemoteCommand::new("true")).unwrap();
        assert_eq!(exit.wait(), SPAWN_FAILURE_STATUS);
    }
}
