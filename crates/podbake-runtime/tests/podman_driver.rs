mod common;

use common::FakeEngine;
use podbake_runtime::{CommitOptions, ContainerConfig, Driver, PodmanDriver, RuntimeError};
use std::path::Path;

#[test]
fn start_container_takes_last_stdout_line_as_id() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);
    let config = ContainerConfig {
        image: "alpine".to_owned(),
        run_command: vec!["-d".to_owned(), "--".to_owned(), "alpine".to_owned()],
        privileged: true,
        ..ContainerConfig::default()
    };

    assert_eq!(driver.start_container(&config).unwrap(), "c1");
    assert_eq!(engine.log_lines(), ["run --privileged -d -- alpine"]);
}

#[test]
fn version_and_inspect_queries() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);

    driver.verify().unwrap();
    assert_eq!(driver.version().unwrap(), "4.9.4");
    assert_eq!(driver.container_user("c1").unwrap(), "builder");
    assert_eq!(driver.image_digest("sha256:committed").unwrap(), "sha256:digest");
    assert_eq!(driver.ip_address("c1").unwrap(), "10.88.0.2");
}

#[test]
fn commit_passes_options() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);
    let options = CommitOptions {
        author: Some("ci".to_owned()),
        message: Some("built".to_owned()),
        changes: vec!["ENV A=1".to_owned()],
    };

    assert_eq!(driver.commit("c1", &options).unwrap(), "sha256:committed");
    assert_eq!(
        engine.log_lines(),
        ["commit --author ci --change ENV A=1 --message built c1"]
    );
}

#[test]
fn commit_without_image_id_fails() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);

    let err = driver.commit("silent", &CommitOptions::default()).unwrap_err();
    match err {
        RuntimeError::CommandFailed { stderr, .. } => {
            assert_eq!(stderr, "engine did not report an image id");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn import_passes_changes_and_repository() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);
    let changes = vec!["CMD /bin/sh".to_owned(), "ENV A=1".to_owned()];

    let id = driver
        .import_image(Path::new("/tmp/rootfs.tar"), &changes, "localhost/app")
        .unwrap();
    assert_eq!(id, "sha256:imported");
    assert_eq!(
        engine.log_lines(),
        ["import --change CMD /bin/sh --change ENV A=1 /tmp/rootfs.tar localhost/app"]
    );
    assert!(driver
        .import_image(Path::new("/tmp/rootfs.tar"), &[], "silent/app")
        .is_err());
}

#[test]
fn export_streams_stdout() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);
    let mut out: Vec<u8> = Vec::new();
    driver.export("c1", &mut out).unwrap();
    assert_eq!(out, b"tarbytes");
}

#[test]
fn failures_carry_engine_stderr() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);
    match driver.kill_container("ghost").unwrap_err() {
        RuntimeError::CommandFailed { stderr, .. } => {
            assert!(stderr.contains("no container with name or ID"), "{stderr}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn login_sends_password_on_stdin_and_pairs_with_logout() {
    let engine = FakeEngine::new();
    let driver = PodmanDriver::new(&engine.bin);

    assert!(matches!(
        driver.logout("quay.io"),
        Err(RuntimeError::NotLoggedIn(_))
    ));
    assert!(engine.log_lines().is_empty());

    driver.login("quay.io", "robot", "hunter2").unwrap();
    driver.logout("quay.io").unwrap();
    assert!(matches!(
        driver.logout("quay.io"),
        Err(RuntimeError::NotLoggedIn(_))
    ));

    assert_eq!(
        engine.log_lines(),
        [
            "login --username robot --password-stdin quay.io",
            "password=hunter2",
            "logout quay.io",
        ]
    );
}

#[test]
fn missing_engine_is_unavailable() {
    let driver = PodmanDriver::new("/nonexistent/podman");
    assert!(matches!(
        driver.verify(),
        Err(RuntimeError::EngineUnavailable(_))
    ));
}
