//! Command-line interface definitions using clap derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Taskweave CLI
#[derive(Parser)]
#[command(name = "taskweave-cli")]
#[command(about = "A multi-agent task orchestration engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify a request and print the intent and routing decision
    Analyze {
        /// The request to classify
        query: String,
    },
    /// Execute a single request end to end
    Run {
        /// The request to execute
        request: String,
        /// Optional session id for shared context data
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Run a batch job from a configuration file
    Batch {
        /// Path to the batch configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}
