//! rxmeta CLI library
//!
//! Argument definitions and command implementations for the `rxmeta` binary.

pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Build i2b2 medications metadata from the NLM RxNav REST API
#[derive(Parser, Debug)]
#[command(name = "rxmeta", version, about)]
pub struct Cli {
    /// Verbose (debug-level) console logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full metadata build
    Build(BuildArgs),

    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Response cache file; reused across runs, safe to delete
    #[arg(long, default_value = "rxcui.cache", env = "RXMETA_CACHE")]
    pub cache: PathBuf,

    /// Directory the metadata file is written into
    #[arg(long, default_value = "./")]
    pub output_dir: PathBuf,

    /// Metadata file name
    #[arg(long, default_value = "rxnorm_ndc.txt")]
    pub output_filename: String,

    /// Directory for log files
    #[arg(long, default_value = "./logs", env = "RXMETA_LOG_DIR")]
    pub log_dir: PathBuf,

    /// Concurrent harvest workers
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Path prefix segment for every emitted row
    #[arg(long, default_value = "i2b2_RXNORM_NDC")]
    pub prefix: String,

    /// Hierarchy level of the prefix row
    #[arg(long, default_value_t = 1)]
    pub prefix_level: usize,

    /// Emit the PROVENANCE folder and legacy applied-path markers
    #[arg(long)]
    pub add_provenance: bool,

    /// RxNav REST base URL
    #[arg(
        long,
        default_value = "https://rxnav.nlm.nih.gov/REST",
        env = "RXMETA_BASE_URL"
    )]
    pub base_url: String,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Maximum attempts per remote request
    #[arg(long, default_value_t = 5)]
    pub max_retries: u32,

    /// Process only the first N seed RxCUIs (smoke runs)
    #[arg(long)]
    pub seed_limit: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show entry count for a cache file
    Stats {
        #[arg(long, default_value = "rxcui.cache", env = "RXMETA_CACHE")]
        cache: PathBuf,
    },
    /// Truncate a cache file, forcing a full re-fetch on the next build
    Clear {
        #[arg(long, default_value = "rxcui.cache", env = "RXMETA_CACHE")]
        cache: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_args_defaults() {
        let cli = Cli::parse_from(["rxmeta", "build"]);
        let Commands::Build(args) = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(args.workers, 4);
        assert_eq!(args.prefix, "i2b2_RXNORM_NDC");
        assert_eq!(args.prefix_level, 1);
        assert!(!args.add_provenance);
    }

    #[test]
    fn test_build_args_overrides() {
        let cli = Cli::parse_from([
            "rxmeta",
            "build",
            "--workers",
            "8",
            "--prefix",
            "MEDS",
            "--add-provenance",
            "--seed-limit",
            "100",
        ]);
        let Commands::Build(args) = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(args.workers, 8);
        assert_eq!(args.prefix, "MEDS");
        assert!(args.add_provenance);
        assert_eq!(args.seed_limit, Some(100));
    }
}
