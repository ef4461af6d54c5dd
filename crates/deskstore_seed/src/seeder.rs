//! Populating a database with sample data.

use crate::fixtures::{dataset, COLLECTIONS};
use crate::generators::random_task;
use chrono::{DateTime, Utc};
use deskstore_core::{CoreResult, Database, RecordKey, TransactionMode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-collection counts inserted by [`Seeder::seed_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Records inserted per collection.
    pub inserted: BTreeMap<String, usize>,
}

impl SeedReport {
    /// Total number of inserted records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted.values().sum()
    }
}

/// Record counts of the dashboard collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedStats {
    /// Sum of all counts.
    pub total_records: usize,
    /// Count per collection.
    pub collections: BTreeMap<String, usize>,
}

/// Options for [`Seeder::generate_random_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomDataOptions {
    /// Target collection.
    pub collection: String,
    /// Number of records to append.
    pub count: usize,
    /// RNG seed. `None` draws fresh entropy on every call.
    pub seed: Option<u64>,
}

impl Default for RandomDataOptions {
    fn default() -> Self {
        Self {
            collection: "tasks".to_string(),
            count: 100,
            seed: None,
        }
    }
}

impl RandomDataOptions {
    /// Creates options appending `count` tasks.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    /// Sets the target collection.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }

    /// Makes generation reproducible.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Fills the dashboard collections of a [`Database`].
///
/// ```rust
/// use deskstore_core::{Database, Schema};
/// use deskstore_seed::{RandomDataOptions, Seeder};
///
/// let db = Database::open_in_memory(Schema::enterprise()).unwrap();
/// let seeder = Seeder::new(&db);
///
/// let report = seeder.seed_all().unwrap();
/// assert_eq!(report.inserted["users"], 5);
///
/// seeder.generate_random_data(&RandomDataOptions::new(10).seed(1)).unwrap();
/// assert_eq!(db.count("tasks").unwrap(), 14);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Seeder<'a> {
    db: &'a Database,
    anchor: Option<DateTime<Utc>>,
}

impl<'a> Seeder<'a> {
    /// Creates a seeder whose dates are relative to the current time.
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db, anchor: None }
    }

    /// Fixes the instant generated dates are relative to.
    #[must_use]
    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    fn anchor(&self) -> DateTime<Utc> {
        self.anchor.unwrap_or_else(Utc::now)
    }

    /// Clears the dashboard collections and inserts the fixed dataset.
    ///
    /// Runs as one transaction: on failure the database is unchanged.
    /// Calling it again resets the collections to the same dataset.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`](deskstore_core::CoreError::Transaction)
    /// if a collection is missing or a record cannot be inserted.
    pub fn seed_all(&self) -> CoreResult<SeedReport> {
        let data = dataset(self.anchor());
        let report = self
            .db
            .run_transaction(&COLLECTIONS, TransactionMode::ReadWrite, |txn| {
                for name in COLLECTIONS {
                    txn.clear(name)?;
                }
                let mut report = SeedReport::default();
                for (name, records) in data {
                    let inserted = records.len();
                    for record in records {
                        txn.add(name, record)?;
                    }
                    debug!(collection = name, inserted, "seeded collection");
                    report.inserted.insert(name.to_string(), inserted);
                }
                Ok(report)
            })?;
        info!(total = report.total(), "seed data loaded");
        Ok(report)
    }

    /// Removes every record from the dashboard collections.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`](deskstore_core::CoreError::Transaction)
    /// if a collection is missing or the clear cannot be persisted.
    pub fn clear_all(&self) -> CoreResult<()> {
        self.db
            .run_transaction(&COLLECTIONS, TransactionMode::ReadWrite, |txn| {
                COLLECTIONS.iter().try_for_each(|name| txn.clear(name))
            })?;
        info!("dashboard collections cleared");
        Ok(())
    }

    /// Counts the records of the dashboard collections.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`](deskstore_core::CoreError::NotFound)
    /// if a collection is missing.
    pub fn stats(&self) -> CoreResult<SeedStats> {
        let mut stats = SeedStats::default();
        for name in COLLECTIONS {
            let count = self.db.count(name)?;
            stats.total_records += count;
            stats.collections.insert(name.to_string(), count);
        }
        Ok(stats)
    }

    /// Appends randomly generated task records without clearing anything.
    ///
    /// With a seed (and a fixed anchor) the generated records are identical
    /// across calls; without one every call differs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`](deskstore_core::CoreError::Transaction)
    /// if the collection is missing or a record cannot be inserted.
    pub fn generate_random_data(&self, options: &RandomDataOptions) -> CoreResult<Vec<RecordKey>> {
        let anchor = self.anchor();
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let collection = options.collection.as_str();

        let keys = self
            .db
            .run_transaction(&[collection], TransactionMode::ReadWrite, |txn| {
                (0..options.count)
                    .map(|i| txn.add(collection, random_task(&mut rng, i, anchor)))
                    .collect::<CoreResult<Vec<_>>>()
            })?;
        info!(collection, generated = keys.len(), "random data generated");
        Ok(keys)
    }
}
