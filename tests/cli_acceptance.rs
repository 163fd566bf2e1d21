//! Acceptance tests for the spawn-cache binary
//!
//! Each test gets its own exec root and disk cache directory, and runs the
//! binary from inside the exec root.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct TestWorkspace {
    exec_root: TempDir,
    cache_dir: TempDir,
}

impl TestWorkspace {
    fn new() -> Self {
        Self {
            exec_root: TempDir::new().unwrap(),
            cache_dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.exec_root.path()
    }

    fn spawn_cache(&self) -> Command {
        let mut cmd = Command::new(std::env!("CARGO_BIN_EXE_spawn-cache"));
        cmd.current_dir(self.path())
            .env("SPAWN_CACHE_CACHE_DIR", self.cache_dir.path())
            .env("SPAWN_CACHE_LOG_FORMAT", "compact")
            .env_remove("SPAWN_CACHE_CONFIG");
        cmd
    }

    fn create_file(&self, path: &str, content: &str) {
        let file_path = self.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(file_path, content).unwrap();
    }

    fn read_file(&self, path: &str) -> String {
        fs::read_to_string(self.path().join(path)).unwrap()
    }

    fn key(&self, manifest: &str) -> String {
        let output = self
            .spawn_cache()
            .args(["key", manifest])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }
}

const COPY_MANIFEST: &str = r#"
name = "copy"
arguments = ["/bin/sh", "-c", "cat in.txt > out/result.txt; echo built"]
inputs = ["in.txt"]
outputs = ["out/result.txt"]

[env]
PATH = "/usr/bin:/bin"
"#;

#[test]
fn test_key_is_deterministic() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("spawn.toml", COPY_MANIFEST);

    let first = ws.key("spawn.toml");
    let second = ws.key("spawn.toml");

    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(first, second);
}

#[test]
fn test_key_tracks_input_content() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("spawn.toml", COPY_MANIFEST);

    let before = ws.key("spawn.toml");
    ws.create_file("in.txt", "goodbye");
    let after = ws.key("spawn.toml");

    assert_ne!(before, after);
}

#[test]
fn test_second_run_is_cache_hit() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("out/.keep", "");
    ws.create_file("spawn.toml", COPY_MANIFEST);

    ws.spawn_cache()
        .args(["run", "spawn.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("built"))
        .stderr(predicate::str::contains("MISS"))
        .stderr(predicate::str::contains("stored"));

    fs::remove_file(ws.path().join("out/result.txt")).unwrap();

    ws.spawn_cache()
        .args(["run", "spawn.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("built"))
        .stderr(predicate::str::contains("HIT"));

    assert_eq!(ws.read_file("out/result.txt"), "hello");
}

#[test]
fn test_no_accept_cached_runs_locally() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("out/.keep", "");
    ws.create_file("spawn.toml", COPY_MANIFEST);

    ws.spawn_cache().args(["run", "spawn.toml"]).assert().success();

    ws.spawn_cache()
        .args(["run", "spawn.toml", "--no-accept-cached"])
        .assert()
        .success()
        .stderr(predicate::str::contains("MISS"));
}

#[test]
fn test_no_upload_leaves_cache_cold() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("out/.keep", "");
    ws.create_file("spawn.toml", COPY_MANIFEST);

    ws.spawn_cache()
        .args(["run", "spawn.toml", "--no-upload"])
        .assert()
        .success()
        .stderr(predicate::str::contains("stored").not());

    ws.spawn_cache()
        .args(["run", "spawn.toml"])
        .assert()
        .success()
        .stderr(predicate::str::contains("MISS"));
}

#[test]
fn test_failed_spawn_is_not_served_from_cache() {
    let ws = TestWorkspace::new();
    ws.create_file(
        "spawn.toml",
        r#"
name = "fail"
arguments = ["/bin/sh", "-c", "echo broken >&2; exit 3"]
"#,
    );

    for _ in 0..2 {
        ws.spawn_cache()
            .args(["run", "spawn.toml"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("broken"))
            .stderr(predicate::str::contains("MISS"));
    }
}

#[test]
fn test_missing_manifest_fails() {
    let ws = TestWorkspace::new();

    ws.spawn_cache()
        .args(["run", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read manifest"));
}

#[test]
fn test_config_file_disables_lookup() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("out/.keep", "");
    ws.create_file("spawn.toml", COPY_MANIFEST);
    ws.create_file("spawn-cache.toml", "[remote]\naccept_cached = false\n");

    ws.spawn_cache().args(["run", "spawn.toml"]).assert().success();

    ws.spawn_cache()
        .args(["run", "spawn.toml"])
        .assert()
        .success()
        .stderr(predicate::str::contains("MISS"));
}

#[test]
fn test_config_file_disables_upload() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("out/.keep", "");
    ws.create_file("spawn.toml", COPY_MANIFEST);
    ws.create_file("spawn-cache.toml", "[remote]\nupload_local_results = false\n");

    for _ in 0..2 {
        ws.spawn_cache()
            .args(["run", "spawn.toml"])
            .assert()
            .success()
            .stdout(predicate::str::contains("built"))
            .stderr(predicate::str::contains("MISS"))
            .stderr(predicate::str::contains("stored").not());
    }
}

#[test]
fn test_no_upload_keeps_spawn_exit_code() {
    let ws = TestWorkspace::new();
    ws.create_file(
        "spawn.toml",
        r#"
name = "fail"
arguments = ["/bin/sh", "-c", "exit 4"]
"#,
    );

    ws.spawn_cache()
        .args(["run", "spawn.toml"])
        .env("SPAWN_CACHE_NO_UPLOAD", "true")
        .assert()
        .code(4);
}

#[test]
fn test_key_does_not_open_cache() {
    let ws = TestWorkspace::new();
    ws.create_file("in.txt", "hello");
    ws.create_file("spawn.toml", COPY_MANIFEST);

    ws.key("spawn.toml");

    assert!(!ws.cache_dir.path().join("cas").exists());
    assert!(!ws.cache_dir.path().join("ac").exists());
}
