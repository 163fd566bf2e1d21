/// Local spawn runner
///
/// Runs a spawn's command line in the exec root with exactly the spawn's
/// environment, redirecting stdout and stderr into the context's
/// `FileOutErr` files, and enforces the context timeout.
use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::context::FileOutErr;
use crate::logging::{operations, services};
use crate::spawn::{Spawn, SpawnResult, Status};

pub const RUNNER_NAME: &str = "local";

/// Exit code reported for a spawn killed on timeout (128 + SIGKILL)
pub const TIMEOUT_EXIT_CODE: i32 = 128 + 9;

pub struct LocalRunner {
    exec_root: PathBuf,
}

impl LocalRunner {
    pub fn new(exec_root: impl Into<PathBuf>) -> Self {
        Self {
            exec_root: exec_root.into(),
        }
    }

    pub fn exec_root(&self) -> &Path {
        &self.exec_root
    }

    /// Execute the spawn and classify its outcome
    pub fn run(
        &self,
        spawn: &Spawn,
        out_err: &FileOutErr,
        timeout: Option<Duration>,
    ) -> Result<SpawnResult> {
        let (program, args) = spawn
            .arguments()
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Spawn has an empty argument vector"))?;

        // Resolve against the spawn's PATH when it sets one, otherwise ours
        let program_path = match spawn.environment().get("PATH") {
            Some(path) => which::which_in(program, Some(path), &self.exec_root),
            None => which::which(program),
        }
        .unwrap_or_else(|_| PathBuf::from(program));

        let stdout = File::create(out_err.stdout_path()).with_context(|| {
            format!(
                "Failed to create stdout file: {}",
                out_err.stdout_path().display()
            )
        })?;
        let stderr = File::create(out_err.stderr_path()).with_context(|| {
            format!(
                "Failed to create stderr file: {}",
                out_err.stderr_path().display()
            )
        })?;

        let mut cmd = Command::new(&program_path);
        cmd.args(args)
            .env_clear()
            .envs(spawn.environment())
            .current_dir(&self.exec_root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        debug!(service = services::RUNNER, command = ?cmd, "spawning");

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn: {}", program_path.display()))?;

        let (status, timed_out) = match timeout {
            Some(timeout) if !timeout.is_zero() => wait_with_timeout(&mut child, timeout)?,
            _ => (
                Some(child.wait().context("Failed to wait for child process")?),
                false,
            ),
        };

        let duration = start.elapsed();

        let result = if timed_out {
            SpawnResult::local(TIMEOUT_EXIT_CODE, RUNNER_NAME).with_status(Status::TimeoutExceeded)
        } else {
            match status.and_then(|s| s.code()) {
                Some(code) => SpawnResult::local(code, RUNNER_NAME),
                // Killed by a signal
                None => SpawnResult::local(-1, RUNNER_NAME).with_status(Status::ExecutionFailed),
            }
        };

        info!(
            service = services::RUNNER,
            operation = operations::EXECUTE,
            exit_code = result.exit_code,
            duration_ms = duration.as_millis() as u64,
            "spawn finished"
        );

        Ok(result)
    }
}

/// Poll the child until it exits or the timeout passes
///
/// Returns `(None, true)` when the child was killed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<(Option<ExitStatus>, bool)> {
    let start = Instant::now();

    loop {
        match child.try_wait()? {
            Some(status) => return Ok((Some(status), false)),
            None => {
                if start.elapsed() >= timeout {
                    child.kill()?;
                    child.wait()?; // Reap zombie
                    return Ok((None, true));
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn shell(script: &str) -> Spawn {
        Spawn::new(["/bin/sh", "-c", script]).with_env("PATH", "/usr/bin:/bin")
    }

    #[test]
    fn test_run_captures_output() {
        let temp = TempDir::new().unwrap();
        let out_err = FileOutErr::in_dir(temp.path(), "echo");

        let result = LocalRunner::new(temp.path())
            .run(&shell("echo hello > out.txt; echo done"), &out_err, None)
            .unwrap();

        assert!(result.is_success());
        assert!(!result.cache_hit);
        assert_eq!(fs::read_to_string(temp.path().join("out.txt")).unwrap(), "hello\n");
        assert_eq!(out_err.read_stdout().unwrap(), b"done\n");
    }

    #[test]
    fn test_run_uses_only_spawn_environment() {
        let temp = TempDir::new().unwrap();
        let out_err = FileOutErr::in_dir(temp.path(), "env");
        let spawn = shell("echo \"$GREETING-$HOME\"").with_env("GREETING", "hi");

        LocalRunner::new(temp.path())
            .run(&spawn, &out_err, None)
            .unwrap();

        assert_eq!(out_err.read_stdout().unwrap(), b"hi-\n");
    }

    #[test]
    fn test_non_zero_exit() {
        let temp = TempDir::new().unwrap();
        let out_err = FileOutErr::in_dir(temp.path(), "fail");

        let result = LocalRunner::new(temp.path())
            .run(&shell("echo oops >&2; exit 3"), &out_err, None)
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.status, Status::NonZeroExit);
        assert_eq!(out_err.read_stderr().unwrap(), b"oops\n");
    }

    #[test]
    fn test_timeout() {
        let temp = TempDir::new().unwrap();
        let out_err = FileOutErr::in_dir(temp.path(), "slow");

        let result = LocalRunner::new(temp.path())
            .run(&shell("sleep 10"), &out_err, Some(Duration::from_millis(200)))
            .unwrap();

        assert_eq!(result.status, Status::TimeoutExceeded);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    }

    #[test]
    fn test_empty_arguments_rejected() {
        let temp = TempDir::new().unwrap();
        let out_err = FileOutErr::in_dir(temp.path(), "empty");
        let spawn = Spawn::new(Vec::<String>::new());

        assert!(LocalRunner::new(temp.path())
            .run(&spawn, &out_err, None)
            .is_err());
    }
}
