/// `spawn-cache run` command implementation
///
/// Looks the manifest's spawn up in the disk cache, runs it locally on a
/// miss and stores the result through the cache handle.
use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use super::{load_config, manifest_context};
use crate::cli::RunArgs;
use crate::context::{FileOutErr, ProgressStatus, SpawnExecutionContext};
use crate::digest::DigestUtil;
use crate::error::SpawnCacheError;
use crate::logging;
use crate::manifest::SpawnManifest;
use crate::merger::MergedConfig;
use crate::remote::DiskCache;
use crate::reporter::{Reporter, TracingReporter};
use crate::runner::{LocalRunner, RUNNER_NAME};
use crate::spawn_cache::{CacheHandle, RemoteSpawnCache};

/// Returns the exit code of the spawn
pub fn run(args: &RunArgs) -> Result<i32> {
    let start = Instant::now();

    let file_config = load_config(args.common.config.as_deref())?;
    let config = MergedConfig::merge_run(args, file_config);
    logging::init(&config.log_level, config.log_format);

    let manifest = SpawnManifest::from_file(&args.manifest)?;
    let spawn = manifest.to_spawn();

    let disk_cache = DiskCache::new(&config.cache_dir).with_context(|| {
        format!(
            "Failed to open cache directory: {}",
            config.cache_dir.display()
        )
    })?;

    let spawn_cache = RemoteSpawnCache::new(
        &config.exec_root,
        config.remote,
        Arc::new(disk_cache),
        config.build_request_id.clone(),
        config.command_id.clone(),
        Some(Arc::new(TracingReporter) as Arc<dyn Reporter>),
        DigestUtil::new(),
    );

    let out_dir = tempfile::tempdir().context("Failed to create output directory")?;
    let out_err = FileOutErr::in_dir(out_dir.path(), &manifest.name);
    let context = manifest_context(
        &manifest,
        &config.exec_root,
        out_err.clone(),
        manifest.timeout(),
    );

    let handle = match spawn_cache.lookup(&spawn, &context) {
        Ok(handle) => handle,
        Err(SpawnCacheError::Interrupted) => anyhow::bail!("Interrupted"),
        Err(e) => return Err(e).context("Cache lookup failed"),
    };

    if let CacheHandle::Hit(result) = &handle {
        forward_output(&out_err)?;
        eprintln!(
            "{} | HIT ✓ | {:.2}s (exit: {})",
            manifest.name,
            start.elapsed().as_secs_f64(),
            result.exit_code
        );
        return Ok(result.exit_code);
    }

    context.report(ProgressStatus::Executing, RUNNER_NAME);
    let runner = LocalRunner::new(&config.exec_root);
    let result = runner.run(&spawn, &out_err, manifest.timeout())?;
    forward_output(&out_err)?;

    // NoStore means uploads are disabled; the local result stands on its own
    let stored = match handle {
        CacheHandle::PendingStore(pending) => {
            pending
                .store(&result)
                .context("Failed to store spawn result")?;
            true
        }
        CacheHandle::Hit(_) | CacheHandle::NoStore => false,
    };

    eprintln!(
        "{} | MISS ✗ | {:.2}s (exit: {}{})",
        manifest.name,
        start.elapsed().as_secs_f64(),
        result.exit_code,
        if stored { ", stored" } else { "" }
    );

    Ok(result.exit_code)
}

/// Copy the captured stdout/stderr to the terminal
fn forward_output(out_err: &FileOutErr) -> Result<()> {
    let stdout = out_err.read_stdout().context("Failed to read captured stdout")?;
    if !stdout.is_empty() {
        std::io::stdout()
            .write_all(&stdout)
            .context("Failed to write stdout")?;
    }

    let stderr = out_err.read_stderr().context("Failed to read captured stderr")?;
    if !stderr.is_empty() {
        std::io::stderr()
            .write_all(&stderr)
            .context("Failed to write stderr")?;
    }

    Ok(())
}
