pub mod disk;
pub mod request;

pub use disk::DiskCache;
pub use request::RequestMetadata;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::FileOutErr;
use crate::digest::ActionKey;
use crate::error::CacheError;
use crate::proto::Digest;

/// An output file recorded in an action result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Path relative to the exec root
    pub path: String,
    pub digest: Digest,
    #[serde(default)]
    pub is_executable: bool,
}

/// Record of a previously successful execution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionResult {
    pub exit_code: i32,
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
    #[serde(default)]
    pub stdout_digest: Option<Digest>,
    #[serde(default)]
    pub stderr_digest: Option<Digest>,
}

/// Client for a content-addressable remote cache
///
/// All calls block the caller. Implementations own their retry policy and
/// must return `CacheError::Interrupted` promptly when the caller is asked to
/// stop, without committing partial state.
pub trait RemoteActionCache: Send + Sync {
    /// Look up the result registered for `key`; `CacheError::NotFound` on miss
    fn get_cached_action_result(
        &self,
        key: &ActionKey,
        metadata: &RequestMetadata,
    ) -> Result<ActionResult, CacheError>;

    /// Materialize the outputs and captured streams of `result` under `exec_root`
    fn download(
        &self,
        result: &ActionResult,
        exec_root: &Path,
        out_err: &FileOutErr,
        metadata: &RequestMetadata,
    ) -> Result<(), CacheError>;

    /// Upload output files and captured streams
    ///
    /// The files are always uploaded as blobs. Only when `upload_action` is set
    /// is an action result registered under `key`, making it a future hit.
    fn upload(
        &self,
        key: &ActionKey,
        exec_root: &Path,
        files: &[PathBuf],
        out_err: &FileOutErr,
        upload_action: bool,
        metadata: &RequestMetadata,
    ) -> Result<(), CacheError>;
}
