/// Spawns and their results
///
/// A spawn is one schedulable unit of work: a command line with declared
/// inputs and outputs. Spawns are owned by the executor; the cache only reads
/// them.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Execution info keys that opt a spawn out of caching
pub mod execution_requirements {
    pub const NO_CACHE: &str = "no-cache";
    pub const NO_REMOTE_CACHE: &str = "no-remote-cache";
}

/// A declared input of a spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionInput {
    /// A real file under the exec root
    File { exec_path: PathBuf },
    /// Synthetic input whose contents only exist in memory (e.g. param files)
    Virtual { exec_path: PathBuf, contents: Vec<u8> },
}

impl ActionInput {
    pub fn file(exec_path: impl Into<PathBuf>) -> Self {
        Self::File {
            exec_path: exec_path.into(),
        }
    }

    pub fn virtual_input(exec_path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self::Virtual {
            exec_path: exec_path.into(),
            contents: contents.into(),
        }
    }

    pub fn exec_path(&self) -> &Path {
        match self {
            Self::File { exec_path } | Self::Virtual { exec_path, .. } => exec_path,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }
}

/// Declared relative path -> input, ordered by path
pub type InputMapping = BTreeMap<PathBuf, ActionInput>;

/// One unit of work submitted by the executor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spawn {
    arguments: Vec<String>,
    environment: BTreeMap<String, String>,
    output_files: Vec<PathBuf>,
    platform: BTreeMap<String, String>,
    execution_info: BTreeMap<String, String>,
}

impl Spawn {
    pub fn new<I, S>(arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            arguments: arguments.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_files.push(path.into());
        self
    }

    pub fn with_platform_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.platform.insert(name.into(), value.into());
        self
    }

    pub fn with_execution_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.execution_info.insert(key.into(), value.into());
        self
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }

    pub fn platform(&self) -> &BTreeMap<String, String> {
        &self.platform
    }

    pub fn execution_info(&self) -> &BTreeMap<String, String> {
        &self.execution_info
    }

    /// Whether results of this spawn may be looked up in or written to a cache
    pub fn may_be_cached(&self) -> bool {
        !self
            .execution_info
            .contains_key(execution_requirements::NO_CACHE)
            && !self
                .execution_info
                .contains_key(execution_requirements::NO_REMOTE_CACHE)
    }
}

/// Outcome classification of a spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    NonZeroExit,
    TimeoutExceeded,
    ExecutionFailed,
}

/// Result of running a spawn locally or fetching it from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnResult {
    pub status: Status,
    pub exit_code: i32,
    pub cache_hit: bool,
    pub runner_name: String,
}

impl SpawnResult {
    pub const REMOTE_CACHE_HIT: &'static str = "remote cache hit";

    /// Result synthesized from a cached action result
    pub fn remote_cache_hit(exit_code: i32) -> Self {
        Self {
            status: Status::Success,
            exit_code,
            cache_hit: true,
            runner_name: Self::REMOTE_CACHE_HIT.to_string(),
        }
    }

    /// Result of a local execution; status is derived from the exit code
    pub fn local(exit_code: i32, runner_name: impl Into<String>) -> Self {
        Self {
            status: if exit_code == 0 {
                Status::Success
            } else {
                Status::NonZeroExit
            },
            exit_code,
            cache_hit: false,
            runner_name: runner_name.into(),
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success && self.exit_code == 0
    }
}
