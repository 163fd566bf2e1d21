use anyhow::Result;
use clap::Parser;

use spawn_cache::cli::{Cli, Commands};
use spawn_cache::commands;
use spawn_cache::logging::{self, LogFormat};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler; key and run install logging
    // once their configuration is known
    match cli.command {
        Commands::Key(args) => commands::key::run(&args),
        Commands::Run(args) => {
            let exit_code = commands::run::run(&args)?;
            std::process::exit(exit_code);
        }
        Commands::Config(args) => {
            logging::init("info", LogFormat::from_env());
            commands::config::run(args.command)
        }
    }
}
