//! Stats command implementation.

use super::{open_existing, CliError};
use deskstore_core::{DatabaseStats, Schema};
use serde::Serialize;
use std::path::Path;

/// Database statistics as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    /// Database path.
    pub path: String,
    /// Stored schema version.
    pub version: u32,
    /// Total number of records.
    pub total_records: usize,
    /// Size and count per collection.
    #[serde(flatten)]
    pub stats: DatabaseStats,
}

/// Runs the stats command.
pub fn run(path: &Path, schema: Schema, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !matches!(format, "text" | "json") {
        return Err(CliError::UnknownFormat(format.to_string()).into());
    }

    let db = open_existing(path, schema)?;
    let stats = db.stats()?;
    let report = StatsReport {
        path: path.display().to_string(),
        version: db.version()?,
        total_records: stats.total_records(),
        stats,
    };
    db.close()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }

    Ok(())
}

fn print_text_output(report: &StatsReport) {
    println!("Database: {}", report.path);
    println!("Version:  {}", report.version);
    println!();
    println!("{:<16} {:>8} {:>12}", "Collection", "Records", "Bytes");
    for (name, collection) in &report.stats.collections {
        println!("{:<16} {:>8} {:>12}", name, collection.count, collection.size);
    }
    println!();
    println!(
        "{:<16} {:>8} {:>12}",
        "Total", report.total_records, report.stats.total_size
    );
}
