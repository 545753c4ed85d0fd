//! Built-in provisioners, run through the `Communicator` trait.

use crate::ui::Ui;
use crate::CoreError;
use podbake_runtime::{Communicator, RemoteCommand};
use podbake_schema::{FileDirection, FileProvisioner, ProvisionerSpec, ShellProvisioner};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Run one provisioner to completion.
pub fn run_provisioner(
    spec: &ProvisionerSpec,
    ui: &Arc<dyn Ui>,
    comm: &dyn Communicator,
) -> Result<(), CoreError> {
    info!("running {} provisioner", spec.kind());
    match spec {
        ProvisionerSpec::Shell(shell) => run_shell(shell, ui, comm),
        ProvisionerSpec::File(file) => run_file(file, ui.as_ref(), comm),
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// `export K='V'; ` for each entry, in key order.
fn environment_prefix(shell: &ShellProvisioner) -> String {
    shell
        .environment
        .iter()
        .map(|(key, value)| format!("export {key}={}; ", shell_quote(value)))
        .collect()
}

fn run_shell(
    shell: &ShellProvisioner,
    ui: &Arc<dyn Ui>,
    comm: &dyn Communicator,
) -> Result<(), CoreError> {
    let prefix = environment_prefix(shell);
    for command in &shell.inline {
        ui.say(&format!("Provisioning with shell: {command}"));
        let remote = RemoteCommand::new(format!("{prefix}{command}"))
            .with_stdout(UiLineWriter::new(Arc::clone(ui), false))
            .with_stderr(UiLineWriter::new(Arc::clone(ui), true));
        let status = comm.start(remote)?.wait();
        debug!("'{command}' exited with status {status}");
        if !shell.valid_exit_codes.contains(&status) {
            return Err(CoreError::ProvisionFailed {
                command: command.clone(),
                status,
            });
        }
    }
    Ok(())
}

fn run_file(file: &FileProvisioner, ui: &dyn Ui, comm: &dyn Communicator) -> Result<(), CoreError> {
    match file.direction {
        FileDirection::Upload => {
            ui.say(&format!(
                "Uploading {} => {}",
                file.source.display(),
                file.destination
            ));
            let metadata = fs::metadata(&file.source)?;
            if metadata.is_dir() {
                let source = file.source.to_string_lossy();
                comm.upload_dir(&file.destination, &source, &file.exclude)?;
            } else {
                let mut body = fs::File::open(&file.source)?;
                comm.upload(&file.destination, &mut body, Some(&metadata))?;
            }
        }
        FileDirection::Download => {
            ui.say(&format!(
                "Downloading {} => {}",
                file.destination,
                file.source.display()
            ));
            let mut out = BufWriter::new(fs::File::create(&file.source)?);
            let copied = comm
                .download(&file.destination, &mut out)
                .map_err(CoreError::from)
                .and_then(|()| out.flush().map_err(CoreError::from));
            if let Err(e) = copied {
                drop(out);
                if let Err(remove) = fs::remove_file(&file.source) {
                    debug!("failed to remove partial download {}: {remove}", file.source.display());
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Forwards remote output to the UI one line at a time.
struct UiLineWriter {
    ui: Arc<dyn Ui>,
    stderr: bool,
    pending: Vec<u8>,
}

impl UiLineWriter {
    fn new(ui: Arc<dyn Ui>, stderr: bool) -> Self {
        Self {
            ui,
            stderr,
            pending: Vec::new(),
        }
    }

    fn emit(&self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r');
        if self.stderr {
            self.ui.error(text);
        } else {
            self.ui.message(text);
        }
    }
}

impl Write for UiLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.emit(&line[..end]);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line);
        }
        Ok(())
    }
}

impl Drop for UiLineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
