pub mod config;
pub mod key;
pub mod run;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config_discovery::load_config_with_discovery;
use crate::config::SpawnCacheConfig;
use crate::context::{FileOutErr, LocalExecutionContext};
use crate::digest::DigestUtil;
use crate::manifest::SpawnManifest;
use crate::metadata::FileMetadataCache;

/// Load the explicit or discovered config file and validate it
pub(crate) fn load_config(explicit_path: Option<&str>) -> Result<Option<SpawnCacheConfig>> {
    let config = load_config_with_discovery(explicit_path.map(Path::new))?;
    if let Some(config) = &config {
        config.validate().context("Invalid configuration")?;
    }
    Ok(config)
}

/// Execution context for a manifest, with inputs resolved against `exec_root`
pub(crate) fn manifest_context(
    manifest: &SpawnManifest,
    exec_root: &Path,
    out_err: FileOutErr,
    timeout: Option<Duration>,
) -> LocalExecutionContext {
    let metadata = Arc::new(FileMetadataCache::new(exec_root, DigestUtil::new()));
    LocalExecutionContext::new(manifest.input_mapping(), metadata, timeout, out_err)
}
