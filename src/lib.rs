// Library interface for spawn-cache
// The binary and integration tests both build on these modules

pub mod action;
pub mod cli;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod context;
pub mod digest;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod merger;
pub mod merkle;
pub mod metadata;
pub mod proto;
pub mod remote;
pub mod reporter;
pub mod runner;
pub mod spawn;
pub mod spawn_cache;

// Re-export commonly used types
pub use config::{RemoteOptions, SpawnCacheConfig};
pub use context::{FileOutErr, LocalExecutionContext, ProgressStatus, SpawnExecutionContext};
pub use digest::{ActionKey, DigestUtil};
pub use error::{CacheError, SpawnCacheError};
pub use remote::{ActionResult, DiskCache, RemoteActionCache, RequestMetadata};
pub use spawn::{ActionInput, InputMapping, Spawn, SpawnResult};
pub use spawn_cache::{CacheHandle, RemoteSpawnCache};
