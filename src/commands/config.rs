use anyhow::Result;
use tracing::info;

use crate::cli::ConfigCommands;
use crate::config::SpawnCacheConfig;
use crate::config_discovery::load_config_with_discovery;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { config } => show(config),
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = SpawnCacheConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Cache directory: {}", config.cache.dir);
    println!("  - Accept cached: {}", config.remote.accept_cached);
    println!(
        "  - Upload local results: {}",
        config.remote.upload_local_results
    );
    println!(
        "  - Guard against concurrent changes: {}",
        config.remote.guard_against_concurrent_changes
    );

    Ok(())
}

fn generate() -> Result<()> {
    println!("{}", SpawnCacheConfig::example()?);
    Ok(())
}

fn show(config_path: Option<String>) -> Result<()> {
    info!("Showing effective configuration");

    let config = load_config_with_discovery(config_path.as_deref().map(std::path::Path::new))?
        .unwrap_or_default();

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
