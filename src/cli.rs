use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stacklens")]
#[command(version)]
#[command(about = "Group Android crash, ANR and tombstone reports by signature")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where to read from and how to read it
#[derive(clap::Args)]
pub struct SourceArgs {
    /// Extracted DropBox directory or bugreport .zip
    pub path: PathBuf,

    /// JSON file mapping package names to app labels
    #[arg(long)]
    pub labels: Option<PathBuf>,

    /// Merge with a SQLite cache (default ~/.stacklens/crashes.db)
    #[arg(long, num_args = 0..=1, value_name = "DB")]
    pub cache: Option<Option<PathBuf>>,

    /// JSON settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Per-entry byte cap
    #[arg(long, value_name = "BYTES")]
    pub max_content: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List or group crashes found in a DropBox dump
    Scan {
        #[command(flatten)]
        source: SourceArgs,

        /// Time window in hours
        #[arg(long)]
        hours: Option<u32>,

        /// all, crashes, anrs or native
        #[arg(long = "type", default_value = "all")]
        type_filter: String,

        /// DropBox tag to include (repeatable)
        #[arg(long = "category", value_name = "TAG")]
        categories: Vec<String>,

        /// Only this package
        #[arg(long)]
        package: Option<String>,

        /// Case-insensitive text search
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        oldest_first: bool,

        /// Show signature groups instead of the flat list
        #[arg(long)]
        group: bool,

        #[arg(long)]
        json: bool,

        /// IANA timezone for displayed times
        #[arg(long, default_value = "UTC")]
        tz: String,

        /// Evaluate the time window at this instant instead of now
        #[arg(long, value_name = "TIME")]
        at: Option<String>,
    },

    /// Print the exception type and signature of one crash body
    Signature {
        file: PathBuf,

        #[arg(long, default_value = "data_app_crash")]
        category: String,

        #[arg(long)]
        json: bool,
    },

    /// List packages with app crashes or ANRs
    Packages {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Count entries per category
    Stats {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        hours: Option<u32>,
    },

    /// Summarize one crash with a local model CLI
    Explain {
        #[command(flatten)]
        source: SourceArgs,

        /// Crash id (its timestamp in epoch ms)
        #[arg(long)]
        id: i64,

        /// Model command line; the prompt is written to its stdin
        #[arg(long, default_value = "ollama run gemma3")]
        model: String,

        #[arg(long)]
        json: bool,
    },
}
