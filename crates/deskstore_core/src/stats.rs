//! Storage statistics.

use serde::Serialize;
use std::collections::BTreeMap;

/// Size and record count of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Number of records.
    pub count: usize,
    /// Length in bytes of the collection's records serialized as a JSON array.
    pub size: u64,
}

/// Statistics for every collection of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    /// Sum of all collection sizes.
    pub total_size: u64,
    /// Per-collection statistics.
    pub collections: BTreeMap<String, CollectionStats>,
}

impl DatabaseStats {
    pub(crate) fn insert(&mut self, name: &str, stats: CollectionStats) {
        self.total_size += stats.size;
        self.collections.insert(name.to_string(), stats);
    }

    /// Total number of records.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.collections.values().map(|c| c.count).sum()
    }
}
