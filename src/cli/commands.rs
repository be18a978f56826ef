//! CLI command definitions and argument parsing

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "vecmigrate")]
#[command(about = "Migrate relational records into a unified pgvector embedding store")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: configured level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to the configuration file (default: config.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the unified store and progress tables
    Init {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// List registered tables with row and embedded counts
    Tables,
    /// Run a migration in the foreground (Ctrl-C pauses it)
    Migrate {
        /// Tables to migrate (comma separated, default: every registered table)
        #[arg(short, long, value_delimiter = ',')]
        tables: Vec<String>,
        /// Records fetched per batch (default: from config)
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Number of concurrent workers (default: from config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Continue the paused migration instead of starting over
        #[arg(short, long)]
        resume: bool,
    },
    /// Show the persisted migration progress
    Progress {
        /// Print the raw progress report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List past migration runs, newest first
    History {
        /// Only runs in this status (processing, paused, stopped, completed, error)
        #[arg(short, long)]
        status: Option<String>,
        /// Maximum number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Print the entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Abandon a paused migration
    Stop,
    /// Delete the persisted migration progress
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Show current configuration
    Config,
}
