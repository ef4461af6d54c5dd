//! Backup, restore and validate commands.
//!
//! Snapshots are the JSON documents produced by `Database::backup`. All three
//! commands go through the database API, so restores are atomic and checked
//! before anything is replaced.

use super::open_existing;
use deskstore_core::{Database, Schema};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes a snapshot of the database to `output_path`.
pub fn create(
    db_path: &Path,
    schema: Schema,
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Creating backup of {:?}", db_path);

    let db = open_existing(db_path, schema)?;
    let snapshot = db.backup()?;
    let info = db.validate_backup(&snapshot)?;
    db.close()?;

    let mut file = fs::File::create(output_path)?;
    file.write_all(snapshot.as_bytes())?;
    file.sync_all()?;

    println!("✓ Backup created successfully");
    println!("  Path: {:?}", output_path);
    println!("  Size: {} bytes", snapshot.len());
    println!("  Records: {}", info.record_count);
    println!("  Version: {}", info.version);
    println!("  Timestamp: {}", info.timestamp);

    Ok(())
}

/// Replaces the database contents with the snapshot in `input_path`.
///
/// The database is created if it does not exist yet.
pub fn restore(
    db_path: &Path,
    schema: Schema,
    input_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Restoring database from {:?}", input_path);

    let snapshot = fs::read_to_string(input_path)?;
    let db = Database::open_path(db_path, schema)?;
    let stats = db.restore(&snapshot)?;
    db.close()?;

    println!("✓ Restore completed successfully");
    println!("  Records cleared: {}", stats.records_cleared);
    println!("  Records restored: {}", stats.records_restored);
    for (collection, count) in &stats.collections {
        println!("    {:<16} {}", collection, count);
    }

    Ok(())
}

/// Checks the snapshot in `input_path` against the database schema.
pub fn validate(
    db_path: &Path,
    schema: Schema,
    input_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = fs::read_to_string(input_path)?;
    let db = open_existing(db_path, schema)?;
    let result = db.validate_backup(&snapshot);
    db.close()?;

    match result {
        Ok(info) => {
            println!("✓ Backup is valid");
            println!("  Version: {}", info.version);
            println!("  Timestamp: {}", info.timestamp);
            println!("  Records: {}", info.record_count);
            for (collection, count) in &info.collections {
                println!("    {:<16} {}", collection, count);
            }
            Ok(())
        }
        Err(e) => {
            println!("✗ Backup is invalid: {}", e);
            Err(e.into())
        }
    }
}
