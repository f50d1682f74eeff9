//! CLI commands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Temporal-Graph CLI
#[derive(Parser)]
#[command(name = "temporal-graph")]
#[command(about = "Time-partitioned fact graph with entity timelines")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List partitions and their spans
    Partitions {
        /// Dataset file
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Print every fact valid at an instant
    Snapshot {
        #[arg(short, long)]
        data: PathBuf,
        /// Instant, e.g. 1925 or 1925-03-01
        #[arg(short, long)]
        at: String,
    },
    /// Materialize every entity at an instant
    Entities {
        #[arg(short, long)]
        data: PathBuf,
        /// Schema registry file
        #[arg(short, long)]
        schema: PathBuf,
        #[arg(short, long)]
        at: String,
    },
    /// Print the life stages of one entity
    Timeline {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        schema: PathBuf,
        /// Entity identifier
        #[arg(short, long)]
        entity: String,
        /// Lifespan as begin/end (default: big-bang/dooms-day)
        #[arg(short, long)]
        lifespan: Option<String>,
    },
}
