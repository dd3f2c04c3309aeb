//! # cache-cli
//!
//! CLI tool for exercising the coordination cache against an in-memory store.
//!
//! ## Commands
//!
//! - `replay`: Run a scenario and print the events a listener shape observes
//! - `snapshot`: Run a scenario and print the final cache contents
//!
//! ## Example
//!
//! ```bash
//! # Watch a subtree through the tree-shaped listener
//! cache-cli replay scenario.toml --listener tree
//!
//! # Same scenario, unified events as JSON lines
//! cache-cli replay scenario.toml --json
//!
//! # Show what the cache holds once the scenario settles
//! cache-cli snapshot scenario.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod scenario;

use commands::{replay, snapshot, ListenerShape};

/// CLI tool for exercising the coordination cache.
#[derive(Parser, Debug)]
#[command(name = "cache-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log cache internals at debug level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// How long to let the cache settle after the last step, in milliseconds
    #[arg(long, global = true, default_value = "200")]
    settle_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scenario and print observed events
    Replay {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Listener shape to attach
        #[arg(long, value_enum, default_value = "unified")]
        listener: ListenerShape,

        /// Print one JSON object per event
        #[arg(long)]
        json: bool,
    },

    /// Replay a scenario and print the final cache contents
    Snapshot {
        /// Scenario file (TOML)
        scenario: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settle = std::time::Duration::from_millis(cli.settle_ms);
    match cli.command {
        Commands::Replay {
            scenario,
            listener,
            json,
        } => {
            replay::run(&scenario, listener, json, settle).await?;
        }
        Commands::Snapshot { scenario } => {
            snapshot::run(&scenario, settle).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "info,coord_cache_client=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
