//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// taskindex - incremental task index over document corpora
#[derive(Parser)]
#[command(
    name = "ti",
    about = "Incremental task index over plain-text and node-graph documents",
    version,
    after_help = "Logs are written to: ~/.local/share/taskindex/logs/taskindex.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the indexing daemon in the foreground
    Run,

    /// One-shot full scan, print a summary, and exit
    Scan,

    /// Query the index
    Query {
        #[command(subcommand)]
        query: QueryCommand,
    },

    /// List known projects and contexts
    Projects,
}

/// Query subcommands
#[derive(Subcommand)]
pub enum QueryCommand {
    /// All indexed tasks
    All,

    /// Tasks belonging to a project
    Project {
        /// Project name
        name: String,
    },

    /// A single task by id
    Id {
        /// Task id
        id: String,
    },

    /// Tasks whose date field falls inside a range
    Range {
        /// Start date (YYYY-MM-DD, inclusive)
        from: String,

        /// End date (YYYY-MM-DD, inclusive)
        to: String,

        /// Date field to compare (due, start, scheduled, completed, cancelled)
        #[arg(short, long, default_value = "due")]
        field: String,
    },
}
