/// Input metadata captured when a spawn's inputs are hashed
///
/// The metadata recorded for a real file carries a `FileContentsProxy`, a
/// cheap stat-based stand-in for the file's contents. Comparing a fresh stat
/// against the proxy tells whether the file changed after it was digested,
/// without re-hashing it.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use crate::digest::DigestUtil;
use crate::proto::Digest;
use crate::spawn::ActionInput;

/// Stat-derived signal that changes whenever a file's contents change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContentsProxy {
    size: u64,
    modified: Option<SystemTime>,
    #[cfg(unix)]
    ctime: (i64, i64),
    #[cfg(unix)]
    inode: u64,
}

impl FileContentsProxy {
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        use std::os::unix::fs::MetadataExt;

        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            #[cfg(unix)]
            ctime: (metadata.ctime(), metadata.ctime_nsec()),
            #[cfg(unix)]
            inode: metadata.ino(),
        }
    }
}

/// Metadata of one input, recorded once and only compared afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMetadata {
    digest: Digest,
    is_executable: bool,
    proxy: Option<FileContentsProxy>,
}

impl InputMetadata {
    /// Metadata of an in-memory input; never considered modified
    pub fn for_virtual(digest: Digest) -> Self {
        Self {
            digest,
            is_executable: false,
            proxy: None,
        }
    }

    pub fn for_file(digest: Digest, is_executable: bool, proxy: FileContentsProxy) -> Self {
        Self {
            digest,
            is_executable,
            proxy: Some(proxy),
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn is_executable(&self) -> bool {
        self.is_executable
    }

    /// Whether `path` no longer matches the state it had when it was digested
    ///
    /// A file that disappeared counts as modified.
    pub fn was_modified_since_digest(&self, path: &Path) -> io::Result<bool> {
        let Some(recorded) = &self.proxy else {
            return Ok(false);
        };

        match fs::metadata(path) {
            Ok(current) => Ok(FileContentsProxy::from_metadata(&current) != *recorded),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }
}

/// Source of input metadata for the execution context
pub trait MetadataProvider: Send + Sync {
    fn metadata(&self, input: &ActionInput) -> io::Result<InputMetadata>;
}

/// Memoizing metadata provider for inputs under an exec root
///
/// Each file is stat'ed and hashed at most once; later requests return the
/// recorded metadata even if the file changed on disk in the meantime.
pub struct FileMetadataCache {
    exec_root: PathBuf,
    digest_util: DigestUtil,
    entries: Mutex<HashMap<PathBuf, InputMetadata>>,
}

impl FileMetadataCache {
    pub fn new(exec_root: impl Into<PathBuf>, digest_util: DigestUtil) -> Self {
        Self {
            exec_root: exec_root.into(),
            digest_util,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn exec_root(&self) -> &Path {
        &self.exec_root
    }

    fn compute_file_metadata(&self, exec_path: &Path) -> io::Result<InputMetadata> {
        let path = self.exec_root.join(exec_path);

        // Stat before hashing so a write racing with the hash shows up as a
        // proxy mismatch later.
        let stat = fs::metadata(&path)?;
        if !stat.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let digest = self.digest_util.compute_file(&path)?;
        Ok(InputMetadata::for_file(
            digest,
            is_executable(&stat),
            FileContentsProxy::from_metadata(&stat),
        ))
    }
}

impl MetadataProvider for FileMetadataCache {
    fn metadata(&self, input: &ActionInput) -> io::Result<InputMetadata> {
        match input {
            ActionInput::Virtual { contents, .. } => {
                Ok(InputMetadata::for_virtual(self.digest_util.compute(contents)))
            }
            ActionInput::File { exec_path } => {
                if let Some(found) = self
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(exec_path)
                {
                    return Ok(found.clone());
                }

                // Hash outside the lock; two threads racing on the same file
                // compute the same value and the first insert wins.
                let computed = self.compute_file_metadata(exec_path)?;
                let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(entries
                    .entry(exec_path.clone())
                    .or_insert(computed)
                    .clone())
            }
        }
    }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
