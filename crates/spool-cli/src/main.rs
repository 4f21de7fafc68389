//! Spool CLI - Inspect spool queue directories

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "spool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the spool data directory
    #[arg(short, long, default_value = ".spool/data")]
    path: PathBuf,

    /// Name of the queue database inside the store
    #[arg(long, default_value = "events")]
    name: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue depth and store information
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List queued events without removing them
    List {
        /// Maximum number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Hex-encoded 32-byte key for encrypted queues
        #[arg(long, env = "SPOOL_KEY_HEX", hide_env_values = true)]
        key_hex: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let target = commands::StoreTarget {
        path: cli.path,
        name: cli.name,
    };

    // Execute command
    match cli.command {
        Commands::Status { json } => {
            commands::status::execute(&target, json)?;
        }
        Commands::List { limit, key_hex } => {
            commands::list::execute(&target, limit, key_hex.as_deref())?;
        }
    }

    Ok(())
}
