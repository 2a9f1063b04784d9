//! rxmeta - main entry point

use clap::Parser;
use rxmeta_cli::{Cli, Commands};
use rxmeta_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig {
        level: if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        },
        ..LogConfig::default()
    };
    if let Commands::Build(ref args) = cli.command {
        // builds also log to a file under the configured log directory, so a
        // multi-hour harvest survives a detached terminal
        log_config.output = LogOutput::Both;
        log_config.log_dir = args.log_dir.clone();
    }
    let log_config = log_config.from_env();
    // the CLI still works if logging cannot initialize
    let _ = init_logging(&log_config);

    if let Err(e) = execute(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute(cli: &Cli) -> rxmeta_cli::Result<()> {
    match &cli.command {
        Commands::Build(args) => rxmeta_cli::commands::build::run(args).await,
        Commands::Cache { command } => match command {
            rxmeta_cli::CacheCommand::Stats { cache } => rxmeta_cli::commands::cache::stats(cache),
            rxmeta_cli::CacheCommand::Clear { cache, yes } => {
                rxmeta_cli::commands::cache::clear(cache, *yes)
            }
        },
    }
}
