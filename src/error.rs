use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a remote cache operation
#[derive(Error, Debug)]
pub enum CacheError {
    /// The key (or a blob it references) is not in the cache
    #[error("not found in the remote cache")]
    NotFound,

    #[error("{0}")]
    Transport(String),

    /// The calling thread was asked to stop while blocked on the cache
    #[error("interrupted")]
    Interrupted,
}

impl CacheError {
    /// Message used in user-facing warnings; never empty
    pub fn describe(&self) -> String {
        match self {
            CacheError::Transport(message) if message.trim().is_empty() => {
                "TransportError".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted => CacheError::Interrupted,
            _ => CacheError::Transport(err.to_string()),
        }
    }
}

/// Errors surfaced by the spawn cache to the executor
///
/// Remote cache failures are never part of this type: they are reported as
/// warnings and the build falls back to local execution.
#[derive(Error, Debug)]
pub enum SpawnCacheError {
    #[error("interrupted while waiting for the remote cache")]
    Interrupted,

    #[error("failed to compute input metadata: {0}")]
    Io(#[from] io::Error),

    #[error("cache handle has no result")]
    NoResult,

    #[error("store called on a cache handle that does not store results")]
    StoreNotExpected,

    #[error("{} was modified during execution", path.display())]
    ConcurrentModification { path: PathBuf },

    /// An input could not be re-checked after execution
    #[error("{}: {source}", path.display())]
    InputCheck {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
