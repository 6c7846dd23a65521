//! Binary entry point for crmsync.
//!
//! The CLI drives the library against local JSON files: it ranks similarity
//! replies and walks a windowed list over an in-memory record set.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crmsync::config::CrmSyncConfig;
use crmsync::observability::{self, LoggingConfig};

/// crmsync - windowed CRM list synchronization and similarity ranking.
#[derive(Parser)]
#[command(name = "crmsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "CRMSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Rank a similarity reply and decide link-or-create.
    Merge {
        /// JSON file holding `[{index, module, result: [...]}]`.
        file: PathBuf,

        /// Print the ranking as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Walk a windowed list over a JSON array of records.
    Browse {
        /// JSON file holding an array of records.
        file: PathBuf,

        /// Module to list.
        #[arg(short, long, default_value = "Contacts")]
        module: String,

        /// Sort index: updated, name, or id.
        #[arg(short, long, default_value = "updated")]
        index: String,

        /// Sort order: asc or desc.
        #[arg(short, long, default_value = "desc")]
        order: String,

        /// Named filter (matches record tags).
        #[arg(short, long)]
        filter: Option<String>,

        /// Forward scroll steps after the initial fill.
        #[arg(short, long, default_value = "0")]
        scroll: usize,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(cli: Cli, config: CrmSyncConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Merge { file, json } => commands::cmd_merge(&file, json),
        Commands::Browse {
            file,
            module,
            index,
            order,
            filter,
            scroll,
        } => {
            let options = commands::BrowseOptions {
                module,
                index,
                order,
                filter,
                scroll,
            };
            commands::cmd_browse(&config, &file, options).await
        },
        Commands::Config { show } => commands::cmd_config(&config, show),
    }
}

/// Loads configuration from an explicit path or the default location.
fn load_config(path: Option<&Path>) -> crmsync::Result<CrmSyncConfig> {
    match path {
        Some(path) => CrmSyncConfig::load_from_file(path),
        None => Ok(CrmSyncConfig::load_default()),
    }
}
