/// `spawn-cache key` command implementation
///
/// Prints the action key of a manifest without touching any cache.
use anyhow::{Context, Result};

use super::{load_config, manifest_context};
use crate::action::spawn_action_key;
use crate::cli::KeyArgs;
use crate::context::FileOutErr;
use crate::digest::DigestUtil;
use crate::logging;
use crate::manifest::SpawnManifest;
use crate::merger::MergedConfig;
use crate::merkle::MerkleTreeBuilder;

pub fn run(args: &KeyArgs) -> Result<()> {
    let file_config = load_config(args.common.config.as_deref())?;
    let config = MergedConfig::merge(&args.common, file_config);
    logging::init(&config.log_level, config.log_format);

    let manifest = SpawnManifest::from_file(&args.manifest)?;
    let spawn = manifest.to_spawn();

    // Output files are never opened while computing the key
    let out_err = FileOutErr::in_dir(&std::env::temp_dir(), &manifest.name);
    let context = manifest_context(&manifest, &config.exec_root, out_err, manifest.timeout());

    let digest_util = DigestUtil::new();
    let key = spawn_action_key(
        &spawn,
        &context,
        &MerkleTreeBuilder::new(digest_util),
        digest_util,
    )
    .with_context(|| format!("Failed to compute action key for {}", args.manifest))?;

    println!("{}", key.hash());

    Ok(())
}
