//! Compact command implementation.

use super::CliError;
use deskstore_storage::{FileBackend, FileOptions, StorageBackend};
use std::path::Path;

/// Log sizes around a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

impl CompactStats {
    /// Bytes reclaimed.
    #[must_use]
    pub fn saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Rewrites the log of the store at `path` as a single image.
pub fn compact(path: &Path) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let backend = FileBackend::new(path, FileOptions::new().create_if_missing(false));
    if !backend.log_path().exists() {
        return Err(CliError::NoDatabase(path.to_path_buf()).into());
    }

    backend.open()?;
    let bytes_before = backend.size()?;
    backend.compact()?;
    let bytes_after = backend.size()?;
    backend.close()?;

    Ok(CompactStats {
        bytes_before,
        bytes_after,
    })
}

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting store at {:?}", path);
    let stats = compact(path)?;

    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        stats.saved(),
        if stats.bytes_before > 0 {
            (stats.saved() as f64 / stats.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );

    Ok(())
}
