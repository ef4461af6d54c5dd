//! DeskStore CLI
//!
//! Command-line tools for file-backed DeskStore databases.
//!
//! # Commands
//!
//! - `seed` - Reset the dashboard collections to the sample dataset
//! - `generate` - Append random task records
//! - `stats` - Display per-collection record counts and sizes
//! - `backup` / `restore` / `validate` - JSON snapshot handling
//! - `query` - Read records with filtering, sorting and pagination
//! - `compact` - Rewrite the storage log as a single image

mod commands;

use clap::{Parser, Subcommand};
use commands::CliError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DeskStore command-line database tools.
#[derive(Parser)]
#[command(name = "deskstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Schema definition file (JSON); defaults to the built-in dashboard schema
    #[arg(global = true, long)]
    schema: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear the dashboard collections and load the sample dataset
    Seed,

    /// Append randomly generated task records
    Generate {
        /// Number of records to generate
        #[arg(short, long, default_value_t = 100)]
        count: usize,

        /// RNG seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Target collection
        #[arg(long, default_value = "tasks")]
        collection: String,
    },

    /// Display database statistics
    Stats {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a JSON snapshot of every collection
    Backup {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replace the database contents with a snapshot
    Restore {
        /// Snapshot file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Check a snapshot without changing the database
    Validate {
        /// Snapshot file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Query a collection
    Query {
        /// Collection to read
        #[arg(short, long)]
        collection: String,

        /// Look records up through this index
        #[arg(long, requires = "value")]
        index: Option<String>,

        /// Index value (parsed as JSON, falling back to a plain string)
        #[arg(long, requires = "index")]
        value: Option<String>,

        /// Sort by this field
        #[arg(long)]
        order_by: Option<String>,

        /// Sort descending
        #[arg(long, requires = "order_by")]
        desc: bool,

        /// Records to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum records to return
        #[arg(long)]
        limit: Option<usize>,

        /// Case-insensitive text to search for
        #[arg(long)]
        search: Option<String>,

        /// Fields to search (comma separated); all fields when omitted
        #[arg(long, value_delimiter = ',', requires = "search")]
        fields: Vec<String>,
    },

    /// Compact the storage log
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let schema = commands::load_schema(cli.schema.as_deref())?;

    match cli.command {
        Commands::Seed => {
            let path = cli.path.ok_or(CliError::PathRequired("seed"))?;
            commands::seed::seed(&path, schema)?;
        }
        Commands::Generate {
            count,
            seed,
            collection,
        } => {
            let path = cli.path.ok_or(CliError::PathRequired("generate"))?;
            commands::seed::generate(&path, schema, count, seed, collection)?;
        }
        Commands::Stats { format } => {
            let path = cli.path.ok_or(CliError::PathRequired("stats"))?;
            commands::stats::run(&path, schema, &format)?;
        }
        Commands::Backup { output } => {
            let path = cli.path.ok_or(CliError::PathRequired("backup"))?;
            commands::backup::create(&path, schema, &output)?;
        }
        Commands::Restore { input } => {
            let path = cli.path.ok_or(CliError::PathRequired("restore"))?;
            commands::backup::restore(&path, schema, &input)?;
        }
        Commands::Validate { input } => {
            let path = cli.path.ok_or(CliError::PathRequired("validate"))?;
            commands::backup::validate(&path, schema, &input)?;
        }
        Commands::Query {
            collection,
            index,
            value,
            order_by,
            desc,
            offset,
            limit,
            search,
            fields,
        } => {
            let path = cli.path.ok_or(CliError::PathRequired("query"))?;
            let request = commands::query::QueryRequest {
                collection,
                index: index.zip(value),
                order_by,
                descending: desc,
                offset,
                limit,
                search,
                fields,
            };
            commands::query::run(&path, schema, &request)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or(CliError::PathRequired("compact"))?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("DeskStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("DeskStore Core v{}", deskstore_core::VERSION);
        }
    }

    Ok(())
}
