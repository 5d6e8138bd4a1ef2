//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::export::ExportArgs;
use crate::commands::push::PushArgs;
use crate::commands::replay::ReplayArgs;

/// Voice-channel roll call.
///
/// Tracks who is present in a voice channel during a session, derives
/// attendance from the join/leave log, and archives the result.
#[derive(Debug, Parser)]
#[command(name = "rc", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the log store and what is waiting to be pushed.
    Status,

    /// Inspect or remove stored session logs.
    #[command(subcommand)]
    Logs(LogsAction),

    /// Write a stored log's attendance reports as CSV files.
    Export(ExportArgs),

    /// Push a stored log to the configured endpoint.
    Push(PushArgs),

    /// Drive sessions from a recorded presence file.
    Replay(ReplayArgs),
}

#[derive(Debug, Subcommand)]
pub enum LogsAction {
    /// List stored logs, oldest first.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show one log with its attendance verdicts.
    Show {
        /// Session log ID.
        id: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete a log. Deleting an unknown ID is not an error.
    Delete {
        /// Session log ID.
        id: String,
    },
}
