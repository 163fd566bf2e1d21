/// Per-spawn execution context supplied by the executor
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::metadata::MetadataProvider;
use crate::spawn::InputMapping;

/// Progress states reported while a spawn is being handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    CheckingCache,
    Executing,
}

/// Files that receive a spawn's captured stdout and stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutErr {
    stdout: PathBuf,
    stderr: PathBuf,
}

impl FileOutErr {
    pub fn new(stdout: impl Into<PathBuf>, stderr: impl Into<PathBuf>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// `<dir>/<name>.out` and `<dir>/<name>.err`
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self::new(
            dir.join(format!("{}.out", name)),
            dir.join(format!("{}.err", name)),
        )
    }

    pub fn stdout_path(&self) -> &Path {
        &self.stdout
    }

    pub fn stderr_path(&self) -> &Path {
        &self.stderr
    }

    /// Captured stdout, empty if nothing was written
    pub fn read_stdout(&self) -> io::Result<Vec<u8>> {
        read_or_empty(&self.stdout)
    }

    /// Captured stderr, empty if nothing was written
    pub fn read_stderr(&self) -> io::Result<Vec<u8>> {
        read_or_empty(&self.stderr)
    }
}

fn read_or_empty(path: &Path) -> io::Result<Vec<u8>> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// What the spawn cache needs from the executor for one spawn
pub trait SpawnExecutionContext {
    fn input_mapping(&self) -> &InputMapping;

    fn metadata_provider(&self) -> &dyn MetadataProvider;

    /// `None` means no timeout
    fn timeout(&self) -> Option<Duration>;

    fn file_out_err(&self) -> &FileOutErr;

    /// Best-effort progress notification
    fn report(&self, status: ProgressStatus, name: &str);
}

/// Plain context used by the local runner and tests
pub struct LocalExecutionContext {
    inputs: InputMapping,
    metadata: Arc<dyn MetadataProvider>,
    timeout: Option<Duration>,
    out_err: FileOutErr,
}

impl LocalExecutionContext {
    pub fn new(
        inputs: InputMapping,
        metadata: Arc<dyn MetadataProvider>,
        timeout: Option<Duration>,
        out_err: FileOutErr,
    ) -> Self {
        Self {
            inputs,
            metadata,
            timeout,
            out_err,
        }
    }
}

impl SpawnExecutionContext for LocalExecutionContext {
    fn input_mapping(&self) -> &InputMapping {
        &self.inputs
    }

    fn metadata_provider(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn file_out_err(&self) -> &FileOutErr {
        &self.out_err
    }

    fn report(&self, status: ProgressStatus, name: &str) {
        debug!(status = ?status, strategy = name, "spawn progress");
    }
}
