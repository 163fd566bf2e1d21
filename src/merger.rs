/// Configuration merger: CLI args > Env vars > Config file > Defaults
///
/// Clap already resolves CLI arguments against `SPAWN_CACHE_*` environment
/// variables, so only the file and built-in defaults remain to be layered in.
use std::path::PathBuf;

use crate::cli::{CommonConfigArgs, RunArgs};
use crate::config::{RemoteOptions, SpawnCacheConfig};
use crate::logging::LogFormat;

/// Merged configuration for the `key` and `run` commands
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub exec_root: PathBuf,
    pub cache_dir: PathBuf,
    pub remote: RemoteOptions,
    pub build_request_id: String,
    pub command_id: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl MergedConfig {
    /// Merge the shared arguments with the config file
    ///
    /// Relative cache directories are resolved against the exec root.
    pub fn merge(common: &CommonConfigArgs, file_config: Option<SpawnCacheConfig>) -> Self {
        let file = file_config.unwrap_or_default();

        let exec_root = common
            .exec_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let cache_dir = PathBuf::from(
            common
                .cache_dir
                .clone()
                .unwrap_or_else(|| file.cache.dir.clone()),
        );
        let cache_dir = if cache_dir.is_relative() {
            exec_root.join(cache_dir)
        } else {
            cache_dir
        };

        Self {
            exec_root,
            cache_dir,
            remote: file.remote,
            build_request_id: common
                .build_request_id
                .clone()
                .unwrap_or_else(|| file.build.build_request_id()),
            command_id: common
                .command_id
                .clone()
                .unwrap_or_else(|| file.build.command_id()),
            log_level: common
                .log_level
                .clone()
                .unwrap_or_else(|| file.observability.log_level.clone()),
            // SPAWN_CACHE_LOG_FORMAT wins over the file
            log_format: std::env::var("SPAWN_CACHE_LOG_FORMAT")
                .ok()
                .and_then(|value| LogFormat::parse(&value))
                .or_else(|| LogFormat::parse(&file.observability.log_format))
                .unwrap_or_else(LogFormat::from_env),
        }
    }

    /// Merge for `run`, where the switch flags can only turn behavior off
    /// (or the guard on) relative to the file
    pub fn merge_run(args: &RunArgs, file_config: Option<SpawnCacheConfig>) -> Self {
        let mut merged = Self::merge(&args.common, file_config);

        if args.no_accept_cached {
            merged.remote.accept_cached = false;
        }
        if args.no_upload {
            merged.remote.upload_local_results = false;
        }
        if args.guard_concurrent_changes {
            merged.remote.guard_against_concurrent_changes = true;
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(common: CommonConfigArgs) -> RunArgs {
        RunArgs {
            manifest: "spawn.toml".to_string(),
            no_accept_cached: false,
            no_upload: false,
            guard_concurrent_changes: false,
            common,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        let merged = MergedConfig::merge(&CommonConfigArgs::default(), None);
        assert_eq!(merged.exec_root, PathBuf::from("."));
        assert_eq!(merged.cache_dir, PathBuf::from("./.spawn-cache/cache"));
        assert_eq!(merged.remote, RemoteOptions::default());
        assert_eq!(merged.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = SpawnCacheConfig::default();
        file.cache.dir = "/from/file".to_string();
        file.build.command_id = Some("file-cmd".to_string());

        let common = CommonConfigArgs {
            cache_dir: Some("/from/cli".to_string()),
            ..Default::default()
        };
        let merged = MergedConfig::merge(&common, Some(file));

        assert_eq!(merged.cache_dir, PathBuf::from("/from/cli"));
        assert_eq!(merged.command_id, "file-cmd");
    }

    #[test]
    fn test_run_flags_override_remote_options() {
        let mut file = SpawnCacheConfig::default();
        file.remote.guard_against_concurrent_changes = false;

        let mut args = run_args(CommonConfigArgs::default());
        args.no_upload = true;
        args.guard_concurrent_changes = true;

        let merged = MergedConfig::merge_run(&args, Some(file));
        assert!(merged.remote.accept_cached);
        assert!(!merged.remote.upload_local_results);
        assert!(merged.remote.guard_against_concurrent_changes);
    }

    #[test]
    fn test_file_switches_survive_absent_flags() {
        let mut file = SpawnCacheConfig::default();
        file.remote.accept_cached = false;

        let merged = MergedConfig::merge_run(&run_args(CommonConfigArgs::default()), Some(file));
        assert!(!merged.remote.accept_cached);
    }
}
