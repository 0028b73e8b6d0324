#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the cityscope livability scorer.
//!
//! Uses `indicatif-log-bridge` (via [`cityscope_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and spinners never fight for the terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cityscope_config::Config;
use cityscope_models::NeighborhoodId;

#[derive(Parser)]
#[command(name = "cityscope", about = "Neighborhood livability scoring")]
struct Cli {
    /// Config file (defaults to `CITYSCOPE_CONFIG` or `cityscope.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every neighborhood and record the results as snapshots
    Score {
        /// Print scores without recording snapshots
        #[arg(long)]
        dry_run: bool,
    },
    /// Start the HTTP API server
    Serve,
    /// Print a neighborhood's snapshot history, newest first
    History {
        /// Neighborhood id
        id: NeighborhoodId,
        /// Maximum number of snapshots to print
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Load the reference data and report row counts
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = cityscope_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Score { dry_run } => {
            commands::score(&multi, &config, dry_run)?;
        }
        Commands::Serve => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_rt::System::new().block_on(cityscope_server::run_server(config))
            })
            .await??;
        }
        Commands::History { id, limit } => {
            commands::history(&config, id, limit)?;
        }
        Commands::Check => {
            commands::check(&multi, &config)?;
        }
    }

    Ok(())
}
