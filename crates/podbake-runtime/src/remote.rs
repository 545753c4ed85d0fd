use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Set-once exit status shared between a running command and its waiters.
///
/// Clones observe the same slot. The first `set` wins; later calls are
/// ignored and report `false`.
#[derive(Clone, Default)]
pub struct ExitStatusCell {
    inner: Arc<(Mutex<Option<i32>>, Condvar)>,
}

impl ExitStatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the exit status and wake every waiter.
    pub fn set(&self, status: i32) -> bool {
        let (slot, ready) = &*self.inner;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(status);
        ready.notify_all();
        true
    }

    /// The published status, without blocking.
    pub fn status(&self) -> Option<i32> {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_set(&self) -> bool {
        self.status().is_some()
    }

    /// Block until the status is published.
    pub fn wait(&self) -> i32 {
        let (slot, ready) = &*self.inner;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(status) = *slot {
                return status;
            }
            slot = ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`; `None` if nothing was published.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<i32> {
        let (slot, ready) = &*self.inner;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = ready
            .wait_timeout_while(slot, timeout, |s| s.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *slot
    }
}

impl fmt::Debug for ExitStatusCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitStatusCell")
            .field("status", &self.status())
            .finish()
    }
}

/// A shell command to run inside the build container.
pub struct RemoteCommand {
    pub command: String,
    pub stdin: Option<Box<dyn Read + Send>>,
    pub stdout: Option<Box<dyn Write + Send>>,
    pub stderr: Option<Box<dyn Write + Send>>,
    exit: ExitStatusCell,
}

impl RemoteCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdin: None,
            stdout: None,
            stderr: None,
            exit: ExitStatusCell::new(),
        }
    }

    #[must_use]
    pub fn with_stdin(mut self, input: impl Read + Send + 'static) -> Self {
        self.stdin = Some(Box::new(input));
        self
    }

    #[must_use]
    pub fn with_stdout(mut self, sink: impl Write + Send + 'static) -> Self {
        self.stdout = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, sink: impl Write + Send + 'static) -> Self {
        self.stderr = Some(Box::new(sink));
        self
    }

    /// Handle on the exit status; stays valid after the command is submitted.
    pub fn exit_cell(&self) -> ExitStatusCell {
        self.exit.clone()
    }

    /// Publish the exit status. Returns `false` if it was already set.
    pub fn set_exited(&self, status: i32) -> bool {
        self.exit.set(status)
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("command", &self.command)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("exit", &self.exit)
            .finish()
    }
}
