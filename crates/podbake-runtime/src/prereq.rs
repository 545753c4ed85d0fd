use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn engine_exists(engine: &Path) -> bool {
    if engine.components().count() > 1 {
        return engine.is_file();
    }
    command_exists(&engine.to_string_lossy())
}

/// Check that the configured engine can be found.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_engine_prereqs(engine: &Path) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !engine_exists(engine) {
        missing.push(MissingPrereq {
            name: engine.display().to_string(),
            purpose: "running and capturing the build container",
            install_hint:
                "zypper install podman | apt install podman | dnf install podman | pacman -S podman",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\npodbake drives an installed container engine to build images.");
    msg
}
