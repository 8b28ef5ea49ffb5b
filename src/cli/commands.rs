use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "recall-tracker")]
#[command(about = "Tracks FDA food recalls in a local document store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (extension optional)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API and run the weekly fetch schedule
    Serve {
        /// Serve only; do not start the scheduler
        #[arg(long)]
        no_schedule: bool,
    },

    /// Run one fetch cycle now
    Update,

    /// List stored recalls
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Maximum number of recalls to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one stored recall
    Show {
        /// Recall number, e.g. F-0123-2024
        recall_number: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show store statistics and recent fetch cycles
    Stats {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Initialize database and write the default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
