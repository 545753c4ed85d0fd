use crate::RuntimeError;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use std::thread;
use tracing::debug;

/// Render an engine invocation for logs and error messages.
pub(crate) fn describe(engine: &Path, args: &[String]) -> String {
    let mut rendered = engine.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

pub(crate) fn spawn_error(engine: &Path, err: &io::Error) -> RuntimeError {
    if err.kind() == io::ErrorKind::NotFound {
        RuntimeError::EngineUnavailable(engine.display().to_string())
    } else {
        RuntimeError::Io(io::Error::new(
            err.kind(),
            format!("failed to run {}: {err}", engine.display()),
        ))
    }
}

/// Run the engine to completion and fail on a nonzero exit.
pub(crate) fn run_engine(engine: &Path, args: &[String]) -> Result<Output, RuntimeError> {
    debug!("running {}", describe(engine, args));
    let output = Command::new(engine)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(engine, &e))?;
    check_output(engine, args, output)
}

pub(crate) fn check_output(
    engine: &Path,
    args: &[String],
    output: Output,
) -> Result<Output, RuntimeError> {
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    Err(RuntimeError::CommandFailed {
        command: describe(engine, args),
        stderr: if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        },
    })
}

pub(crate) fn stdout_trimmed(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

pub(crate) fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<thread::JoinHandle<io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

/// Join a pipe reader and return what it captured, trimmed. Read failures
/// yield an empty string: the captured text is diagnostic only.
pub(crate) fn collect_pipe(handle: Option<thread::JoinHandle<io::Result<Vec<u8>>>>) -> String {
    match handle.map(thread::JoinHandle::join) {
        Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).trim().to_owned(),
        _ => String::new(),
    }
}

/// Map a process exit status to the integer published to waiters.
///
/// Normal exits report their code; on unix a signal termination reports
/// `128 + signal`, the value a shell would report, never a negative status.
/// Anything else reports 1.
pub fn exit_code(status: ExitStatus) -> i32 {
    if status.success() {
        return 0;
    }
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
