//! CLI command implementations.

pub mod backup;
pub mod compact;
pub mod query;
pub mod seed;
pub mod stats;

use deskstore_core::{Database, Schema};
use deskstore_storage::{FileBackend, FileOptions};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the CLI itself rather than the database.
#[derive(Debug, Error)]
pub enum CliError {
    /// A command that needs `--path` was run without it.
    #[error("database path required for {0}")]
    PathRequired(&'static str),

    /// The directory holds no database.
    #[error("no database found at {}", .0.display())]
    NoDatabase(PathBuf),

    /// An unsupported `--format` value.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),
}

/// Loads the schema from `path`, or the built-in dashboard schema.
pub fn load_schema(path: Option<&Path>) -> Result<Schema, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Schema::from_json(&fs::read_to_string(path)?)?),
        None => Ok(Schema::enterprise()),
    }
}

/// Opens a database that must already exist on disk.
pub fn open_existing(path: &Path, schema: Schema) -> Result<Database, Box<dyn std::error::Error>> {
    if !FileBackend::new(path, FileOptions::default()).log_path().exists() {
        return Err(CliError::NoDatabase(path.to_path_buf()).into());
    }
    Ok(Database::open_path(path, schema)?)
}
