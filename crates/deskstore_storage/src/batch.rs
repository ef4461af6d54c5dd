//! Write batches and persisted store images.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single table: key bytes to value bytes, ordered by key.
pub type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Sets the persisted schema version.
    SetVersion(u32),
    /// Stores an opaque metadata value.
    SetMeta {
        /// Metadata key.
        key: String,
        /// Metadata value.
        value: Vec<u8>,
    },
    /// Creates an empty table if it does not exist yet.
    CreateTable {
        /// Table name.
        name: String,
    },
    /// Inserts or replaces a value.
    Put {
        /// Table name.
        table: String,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Removes a value if present.
    Delete {
        /// Table name.
        table: String,
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Removes every value of a table.
    Clear {
        /// Table name.
        table: String,
    },
}

impl Mutation {
    fn table(&self) -> Option<&str> {
        match self {
            Self::Put { table, .. } | Self::Delete { table, .. } | Self::Clear { table } => {
                Some(table)
            }
            _ => None,
        }
    }
}

/// An ordered group of mutations committed atomically.
///
/// Mutations are applied in the order they were pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mutation.
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Appends a `Put`.
    pub fn put(&mut self, table: impl Into<String>, key: Vec<u8>, value: Vec<u8>) {
        self.push(Mutation::Put {
            table: table.into(),
            key,
            value,
        });
    }

    /// Appends a `Delete`.
    pub fn delete(&mut self, table: impl Into<String>, key: Vec<u8>) {
        self.push(Mutation::Delete {
            table: table.into(),
            key,
        });
    }

    /// Appends a `Clear`.
    pub fn clear(&mut self, table: impl Into<String>) {
        self.push(Mutation::Clear {
            table: table.into(),
        });
    }

    /// Appends a `CreateTable`.
    pub fn create_table(&mut self, name: impl Into<String>) {
        self.push(Mutation::CreateTable { name: name.into() });
    }

    /// Appends a `SetVersion`.
    pub fn set_version(&mut self, version: u32) {
        self.push(Mutation::SetVersion(version));
    }

    /// Appends a `SetMeta`.
    pub fn set_meta(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.push(Mutation::SetMeta {
            key: key.into(),
            value,
        });
    }

    /// Moves every mutation of `other` to the end of this batch.
    pub fn extend(&mut self, other: WriteBatch) {
        self.mutations.extend(other.mutations);
    }

    /// Checks that every table a mutation touches either satisfies `exists`
    /// or is created earlier in the batch.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownTable`] naming the first missing table.
    pub fn check_tables(&self, exists: impl Fn(&str) -> bool) -> StorageResult<()> {
        let mut created: BTreeSet<&str> = BTreeSet::new();
        for mutation in &self.mutations {
            if let Mutation::CreateTable { name } = mutation {
                created.insert(name.as_str());
            }
            if let Some(table) = mutation.table() {
                if !exists(table) && !created.contains(table) {
                    return Err(StorageError::UnknownTable(table.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Returns the names of tables created by this batch.
    pub fn created_tables(&self) -> impl Iterator<Item = &str> {
        self.mutations.iter().filter_map(|m| match m {
            Mutation::CreateTable { name } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Returns the mutations in issue order.
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    /// Returns the number of mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if the batch holds no mutations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Everything a backend has persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreImage {
    /// Persisted schema version (0 for a fresh store).
    pub version: u32,
    /// Opaque metadata owned by the engine.
    pub meta: BTreeMap<String, Vec<u8>>,
    /// Tables by name.
    pub tables: BTreeMap<String, Table>,
}

impl StoreImage {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a batch.
    ///
    /// The batch is validated first, so an error leaves the image untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownTable`] if a mutation targets a table
    /// that neither exists nor is created earlier in the batch.
    pub fn apply(&mut self, batch: &WriteBatch) -> StorageResult<()> {
        batch.check_tables(|name| self.tables.contains_key(name))?;

        for mutation in batch.iter() {
            match mutation {
                Mutation::SetVersion(version) => self.version = *version,
                Mutation::SetMeta { key, value } => {
                    self.meta.insert(key.clone(), value.clone());
                }
                Mutation::CreateTable { name } => {
                    self.tables.entry(name.clone()).or_default();
                }
                Mutation::Put { table, key, value } => {
                    if let Some(t) = self.tables.get_mut(table) {
                        t.insert(key.clone(), value.clone());
                    }
                }
                Mutation::Delete { table, key } => {
                    if let Some(t) = self.tables.get_mut(table) {
                        t.remove(key);
                    }
                }
                Mutation::Clear { table } => {
                    if let Some(t) = self.tables.get_mut(table) {
                        t.clear();
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the number of key and value bytes held by the image.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        let meta: usize = self.meta.iter().map(|(k, v)| k.len() + v.len()).sum();
        let tables: usize = self
            .tables
            .iter()
            .map(|(name, table)| {
                name.len() + table.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>()
            })
            .sum();
        (meta + tables) as u64
    }
}
