use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete spawn-cache configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpawnCacheConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub remote: RemoteOptions,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Cache backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disk cache directory path
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: ".spawn-cache/cache".to_string(),
        }
    }
}

/// Switches controlling how the spawn cache uses the remote cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOptions {
    /// Look up spawns in the remote cache before running them
    #[serde(default = "default_true")]
    pub accept_cached: bool,

    /// Upload results of locally executed spawns
    #[serde(default = "default_true")]
    pub upload_local_results: bool,

    /// Skip the upload when an input changed while the spawn was running
    #[serde(default)]
    pub guard_against_concurrent_changes: bool,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            accept_cached: true,
            upload_local_results: true,
            guard_against_concurrent_changes: false,
        }
    }
}

/// Identifiers attached to every remote request of a build
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildConfig {
    /// Build request id; a random one is generated when unset
    pub build_request_id: Option<String>,

    /// Command id; a random one is generated when unset
    pub command_id: Option<String>,
}

impl BuildConfig {
    pub fn build_request_id(&self) -> String {
        self.build_request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    pub fn command_id(&self) -> String {
        self.command_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace|debug|info|warn|error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty|compact|json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl SpawnCacheConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: SpawnCacheConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = SpawnCacheConfig {
            cache: CacheConfig {
                dir: ".spawn-cache/cache".to_string(),
            },
            remote: RemoteOptions {
                accept_cached: true,
                upload_local_results: true,
                guard_against_concurrent_changes: true,
            },
            ..Default::default()
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.dir.trim().is_empty() {
            anyhow::bail!("cache.dir must be set");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.observability.log_level.as_str())
        {
            anyhow::bail!("observability.log_level must be one of: trace, debug, info, warn, error");
        }

        if !["pretty", "compact", "json"].contains(&self.observability.log_format.as_str()) {
            anyhow::bail!("observability.log_format must be one of: pretty, compact, json");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SpawnCacheConfig::default();
        assert_eq!(config.cache.dir, ".spawn-cache/cache");
        assert!(config.remote.accept_cached);
        assert!(config.remote.upload_local_results);
        assert!(!config.remote.guard_against_concurrent_changes);
    }

    #[test]
    fn test_validate_config() {
        let config = SpawnCacheConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_cache_dir_rejected() {
        let mut config = SpawnCacheConfig::default();
        config.cache.dir = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = SpawnCacheConfig::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_remote_section_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spawn-cache.toml");
        fs::write(
            &path,
            r#"
[remote]
accept_cached = false

[build]
command_id = "cmd-42"
"#,
        )
        .unwrap();

        let config = SpawnCacheConfig::from_file(&path).unwrap();
        assert!(!config.remote.accept_cached);
        assert!(config.remote.upload_local_results);
        assert_eq!(config.build.command_id(), "cmd-42");
        assert_eq!(config.cache.dir, ".spawn-cache/cache");
    }

    #[test]
    fn test_example_round_trips() {
        let example = SpawnCacheConfig::example().unwrap();
        let parsed: SpawnCacheConfig = toml::from_str(&example).unwrap();
        assert!(parsed.remote.guard_against_concurrent_changes);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let build = BuildConfig::default();
        assert_ne!(build.build_request_id(), build.build_request_id());
    }
}
