//! CLI subprocess integration tests.
//!
//! These tests invoke the `podbake` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output. Builds run against a shell script
//! standing in for the container engine.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

fn podbake_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_podbake"));
    cmd.env_remove("PODBAKE_LOG").env_remove("PODBAKE_SKIP_PREREQS");
    cmd
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("podbake.toml");
    fs::write(&path, body).unwrap();
    path
}

/// Minimal engine: answers the calls a discard build makes and runs `exec`
/// commands on the host.
fn write_fake_engine(dir: &Path) -> (PathBuf, PathBuf) {
    let log = dir.join("engine.log");
    let bin = dir.join("fake-engine");
    let script = format!(
        r#"#!/bin/sh
echo "$*" >> '{log}'
case "$1" in
  run) echo c1 ;;
  version) echo 4.9.4 ;;
  inspect) echo "" ;;
  exec)
    shift
    while [ $# -gt 0 ]; do
      case "$1" in
        -i|-t) shift ;;
        -u) shift 2 ;;
        *) break ;;
      esac
    done
    shift
    exec "$@"
    ;;
esac
exit 0
"#,
        log = log.display()
    );
    fs::write(&bin, script).unwrap();
    fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
    for _ in 0..100 {
        match Command::new(&bin).arg("--version").output() {
            Ok(_) => break,
            Err(e) if e.raw_os_error() == Some(26) => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("fake engine is not runnable: {e}"),
        }
    }
    fs::write(&log, "").unwrap();
    (bin, log)
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_version_exits_zero() {
    let output = podbake_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "podbake --version must exit 0");
    assert!(stdout(&output).contains("podbake"));
}

#[test]
fn cli_help_lists_commands() {
    let output = podbake_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("build"), "help must list 'build': {text}");
    assert!(text.contains("validate"), "help must list 'validate': {text}");
    assert!(text.contains("inspect-config"), "help must list 'inspect-config': {text}");
}

#[test]
fn cli_validate_accepts_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\ncommit = true\n");

    let output = podbake_bin()
        .args(["validate", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("artifact:     commit"));
}

#[test]
fn cli_validate_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "image = \"alpine\"\ndiscard = true\n\n[[provisioner]]\ntype = \"shell\"\ninline = [\"true\"]\n",
    );

    let output = podbake_bin()
        .args(["--json", "validate", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["artifact"], "discard");
    assert_eq!(json["provisioners"], 1);
}

#[test]
fn cli_validate_rejects_missing_artifact_with_config_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "image = \"alpine\"\n");

    let output = podbake_bin()
        .args(["validate", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("configuration error"));
}

#[test]
fn cli_validate_missing_file_is_config_error() {
    let output = podbake_bin()
        .args(["validate", "/nonexistent/podbake.toml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_inspect_config_applies_defaults_and_redacts_password() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "image = \"alpine\"\ncommit = true\n\n[login]\nserver = \"quay.io\"\nusername = \"robot\"\npassword = \"hunter2\"\n",
    );

    let output = podbake_bin()
        .args(["inspect-config", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(!text.contains("hunter2"));
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["container_dir"], "/packer-files");
    assert_eq!(json["engine"], "podman");
    assert_eq!(json["systemd"], "true");
    assert_eq!(json["login"]["password"], "********");
    assert_eq!(json["run_command"][5], "{{.Image}}");
}

#[test]
fn cli_build_reports_missing_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "image = \"alpine\"\ndiscard = true\nengine = \"/nonexistent/podman\"\n",
    );

    let output = podbake_bin()
        .args(["build", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing prerequisites"));
}

#[test]
fn cli_build_runs_pipeline_against_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, log) = write_fake_engine(dir.path());
    let config = write_config(
        dir.path(),
        &format!(
            "image = \"alpine\"\nengine = \"{}\"\ndiscard = true\n\n[[provisioner]]\ntype = \"shell\"\ninline = [\"echo provisioned\"]\n",
            engine.display()
        ),
    );

    let output = podbake_bin()
        .args([
            "--json",
            "build",
            &config.to_string_lossy(),
            "--temp-root",
            &dir.path().to_string_lossy(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["status"], "built");
    assert_eq!(json["artifact"]["kind"], "discarded");
    assert!(stderr(&output).contains("provisioned"));

    let calls = fs::read_to_string(log).unwrap();
    let lines: Vec<&str> = calls.lines().collect();
    assert_eq!(lines.first(), Some(&"--version"));
    assert!(lines.contains(&"pull alpine"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("exec -i c1 /bin/sh -c (echo provisioned)")));
    assert_eq!(lines.last(), Some(&"kill c1"));
}

#[test]
fn cli_build_failure_exits_one_after_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, log) = write_fake_engine(dir.path());
    let config = write_config(
        dir.path(),
        &format!(
            "image = \"alpine\"\nengine = \"{}\"\npull = false\ndiscard = true\n\n[[provisioner]]\ntype = \"shell\"\ninline = [\"exit 4\"]\n",
            engine.display()
        ),
    );

    let output = podbake_bin()
        .args(["build", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("exited with status 4"));
    let calls = fs::read_to_string(log).unwrap();
    assert_eq!(calls.lines().last(), Some("kill c1"));
}
