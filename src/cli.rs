use clap::{Args, Parser, Subcommand};

/// spawn-cache - Remote cache coordinator for build spawns
///
/// Computes content-addressed action keys for spawns, serves results from the
/// cache when possible and uploads results of locally executed spawns.
#[derive(Parser, Debug)]
#[command(name = "spawn-cache")]
#[command(author = "Tuist Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Remote cache coordinator for build spawns", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across commands
#[derive(Args, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "SPAWN_CACHE_CONFIG")]
    pub config: Option<String>,

    /// Directory the spawn runs in and inputs are resolved against
    #[arg(long, env = "SPAWN_CACHE_EXEC_ROOT")]
    pub exec_root: Option<String>,

    /// Disk cache directory
    #[arg(long, env = "SPAWN_CACHE_CACHE_DIR")]
    pub cache_dir: Option<String>,

    /// Build request id attached to cache requests
    #[arg(long, env = "SPAWN_CACHE_BUILD_REQUEST_ID")]
    pub build_request_id: Option<String>,

    /// Command id attached to cache requests
    #[arg(long, env = "SPAWN_CACHE_COMMAND_ID")]
    pub command_id: Option<String>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "SPAWN_CACHE_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the action key of a spawn manifest
    Key(KeyArgs),

    /// Run a spawn manifest through the cache
    Run(RunArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Path to the spawn manifest (TOML)
    pub manifest: String,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the spawn manifest (TOML)
    pub manifest: String,

    /// Do not look up the spawn in the cache
    #[arg(long, env = "SPAWN_CACHE_NO_ACCEPT_CACHED")]
    pub no_accept_cached: bool,

    /// Do not upload the result of a local execution
    #[arg(long, env = "SPAWN_CACHE_NO_UPLOAD")]
    pub no_upload: bool,

    /// Skip the upload when an input changed during execution
    #[arg(long, env = "SPAWN_CACHE_GUARD_CONCURRENT_CHANGES")]
    pub guard_concurrent_changes: bool,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: String,
    },
    /// Print an example config file
    Generate,
    /// Show effective configuration (discovered file merged with defaults)
    Show {
        /// Config file path
        #[arg(short = 'c', long)]
        config: Option<String>,
    },
}
