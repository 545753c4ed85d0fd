#![allow(dead_code)]

use podbake_runtime::CommunicatorSettings;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Shell stand-in for the container engine. The "container" filesystem is a
/// host directory; every invocation is appended to a log file.
const FAKE_ENGINE: &str = r#"#!/bin/sh
ROOT='@ROOT@'
LOG='@LOG@'
echo "$*" >> "$LOG"
cmd="$1"
shift
case "$cmd" in
  --version)
    echo "fake-engine version 4.9.4"
    ;;
  version)
    echo "4.9.4"
    ;;
  run)
    echo "Trying to pull docker.io/library/alpine:latest..."
    echo "c1"
    ;;
  commit|import)
    for arg in "$@"; do last="$arg"; done
    case "$last" in
      silent*) ;;
      *)
        if [ "$cmd" = commit ]; then echo "sha256:committed"; else echo "sha256:imported"; fi
        ;;
    esac
    ;;
  inspect)
    case "$2" in
      *Config.User*) echo "builder" ;;
      *Digest*) echo "sha256:digest" ;;
      *IPAddress*) echo "10.88.0.2" ;;
    esac
    ;;
  export|save)
    printf 'tarbytes'
    ;;
  kill)
    if [ "$1" != "c1" ]; then
      echo "Error: no container with name or ID \"$1\" found" >&2
      exit 125
    fi
    ;;
  login)
    read -r password
    echo "password=$password" >> "$LOG"
    ;;
  exec)
    while [ $# -gt 0 ]; do
      case "$1" in
        -i|-t) shift ;;
        -u) shift 2 ;;
        --user) exit 0 ;;
        *) break ;;
      esac
    done
    shift
    cd "$ROOT" || exit 1
    exec "$@"
    ;;
  cp)
    src="$1"
    dst="$2"
    case "$src" in
      -)
        dir="${dst#*:}"
        mkdir -p "$ROOT$dir"
        exec tar -x -f - -C "$ROOT$dir"
        ;;
      *:*)
        path="${src#*:}"
        if [ "$path" = "/silent" ]; then
          exit 0
        fi
        if [ ! -e "$ROOT$path" ]; then
          echo "Error: \"$path\" could not be found on container c1" >&2
          exit 125
        fi
        exec tar -c -f - -C "$ROOT$(dirname "$path")" "$(basename "$path")"
        ;;
    esac
    ;;
esac
exit 0
"#;

pub struct FakeEngine {
    pub dir: tempfile::TempDir,
    pub bin: PathBuf,
    /// Container filesystem root.
    pub root: PathBuf,
    /// Host scratch dir.
    pub host: PathBuf,
    pub log: PathBuf,
}

impl FakeEngine {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let host = dir.path().join("host");
        let log = dir.path().join("engine.log");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&host).unwrap();
        fs::write(&log, "").unwrap();

        let bin = dir.path().join("fake-podman");
        let script = FAKE_ENGINE
            .replace("@ROOT@", &root.to_string_lossy())
            .replace("@LOG@", &log.to_string_lossy());
        fs::write(&bin, script).unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        wait_until_executable(&bin);
        fs::write(&log, "").unwrap();

        Self {
            dir,
            bin,
            root,
            host,
            log,
        }
    }

    pub fn settings(&self) -> CommunicatorSettings {
        CommunicatorSettings::new(&self.bin, "c1", &self.host, "/packer-files")
    }

    pub fn log_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    pub fn container_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    pub fn host_entries(&self) -> Vec<String> {
        list(&self.host)
    }
}

/// A freshly written script can briefly fail with ETXTBSY while another test
/// thread forks with the write descriptor still open.
fn wait_until_executable(bin: &Path) {
    for _ in 0..100 {
        match Command::new(bin).arg("--version").output() {
            Ok(_) => return,
            Err(e) if e.raw_os_error() == Some(26) => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("fake engine is not runnable: {e}"),
        }
    }
    panic!("fake engine stayed busy");
}

fn list(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

/// Cloneable in-memory sink for remote command output.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
