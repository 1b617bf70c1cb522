//! TillSync CLI
//!
//! Command-line tools for the data a TillSync terminal keeps on disk.
//!
//! # Commands
//!
//! - `queue list|stats` - Show pending operations
//! - `queue retry-failed|remove|clear` - Repair the queue
//! - `queue push` - Drain the queue against a REST API
//! - `status list|reset` - Show or reset per-table sync progress

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// TillSync command-line tools.
#[derive(Parser)]
#[command(name = "tillsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the terminal's durable slots
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or repair the operation queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Inspect or reset per-table sync status
    Status {
        #[command(subcommand)]
        action: StatusAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List operations in processing order
    List,
    /// Show queue counters
    Stats,
    /// Give failed operations a fresh retry budget
    RetryFailed,
    /// Remove one operation
    Remove {
        /// Operation id
        id: String,
    },
    /// Remove every operation
    Clear,
    /// Send pending operations to the API
    Push {
        /// Base URL of the API
        #[arg(long)]
        api_url: String,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

#[derive(Subcommand)]
enum StatusAction {
    /// List sync status of every table
    List,
    /// Forget sync progress of a table
    Reset {
        /// Table name
        table: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = commands::OutputFormat::parse(&cli.format)?;

    match cli.command {
        Commands::Queue { action } => {
            let dir = cli.data_dir.ok_or("Data directory required for queue")?;
            let data = commands::DataDir::open(&dir)?;
            match action {
                QueueAction::List => commands::queue::list(&data, format)?,
                QueueAction::Stats => commands::queue::stats(&data, format)?,
                QueueAction::RetryFailed => commands::queue::retry_failed(&data, format)?,
                QueueAction::Remove { id } => commands::queue::remove(&data, &id, format)?,
                QueueAction::Clear => commands::queue::clear(&data, format)?,
                QueueAction::Push {
                    api_url,
                    timeout_secs,
                } => commands::queue::push(
                    &data,
                    &api_url,
                    Duration::from_secs(timeout_secs),
                    format,
                )?,
            }
        }
        Commands::Status { action } => {
            let dir = cli.data_dir.ok_or("Data directory required for status")?;
            let data = commands::DataDir::open(&dir)?;
            match action {
                StatusAction::List => commands::status::list(&data, format)?,
                StatusAction::Reset { table } => commands::status::reset(&data, &table, format)?,
            }
        }
        Commands::Version => {
            println!("TillSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
