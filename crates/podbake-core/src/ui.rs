use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// Human-facing narration of a build.
///
/// `say` announces what a step is doing, `message` carries detail such as
/// remote command output, and `error` reports failures.
pub trait Ui: Send + Sync {
    fn say(&self, message: &str);
    fn message(&self, message: &str);
    fn error(&self, message: &str);
}

/// Routes narration into `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        info!("{message}");
    }

    fn message(&self, message: &str) {
        info!("    {message}");
    }

    fn error(&self, message: &str) {
        warn!("{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLevel {
    Say,
    Message,
    Error,
}

/// Keeps every line for later inspection.
#[derive(Debug, Default)]
pub struct MemoryUi {
    lines: Mutex<Vec<(UiLevel, String)>>,
}

impl MemoryUi {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: UiLevel, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_owned()));
    }

    pub fn lines(&self, level: UiLevel) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn said(&self) -> Vec<String> {
        self.lines(UiLevel::Say)
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines(UiLevel::Message)
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines(UiLevel::Error)
    }
}

impl Ui for MemoryUi {
    fn say(&self, message: &str) {
        self.push(UiLevel::Say, message);
    }

    fn message(&self, message: &str) {
        self.push(UiLevel::Message, message);
    }

    fn error(&self, message: &str) {
        self.push(UiLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_ui_separates_levels() {
        let ui = MemoryUi::new();
        ui.say("Pulling image");
        ui.message("layer 1/3");
        ui.error("pull failed");
        assert_eq!(ui.said(), ["Pulling image"]);
        assert_eq!(ui.messages(), ["layer 1/3"]);
        assert_eq!(ui.errors(), ["pull failed"]);
    }
}
