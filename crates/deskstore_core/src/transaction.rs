//! Multi-collection transactions.

use crate::collection::CollectionState;
use crate::error::{CoreError, CoreResult};
use crate::key::RecordKey;
use deskstore_storage::WriteBatch;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Reads only; any write aborts the transaction.
    #[default]
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// A scoped unit of work over a fixed set of collections.
///
/// Obtained through [`Database::run_transaction`](crate::Database::run_transaction).
/// Operations apply in issue order to a private copy of every collection they
/// write, so reads inside the transaction observe earlier writes. Nothing is
/// visible outside until the closure returns `Ok` and the combined batch is
/// committed; on any error the copies are dropped.
///
/// The first write to a collection copies it, so a transaction costs
/// O(size of the collections it writes). Batch many writes into one
/// transaction rather than opening one per record.
#[derive(Debug)]
pub struct Transaction<'a> {
    base: &'a BTreeMap<String, CollectionState>,
    staged: BTreeMap<String, CollectionState>,
    scope: BTreeSet<String>,
    mode: TransactionMode,
    batch: WriteBatch,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        base: &'a BTreeMap<String, CollectionState>,
        scope: BTreeSet<String>,
        mode: TransactionMode,
    ) -> Self {
        Self {
            base,
            staged: BTreeMap::new(),
            scope,
            mode,
            batch: WriteBatch::new(),
        }
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns true if `collection` is part of this transaction.
    #[must_use]
    pub fn in_scope(&self, collection: &str) -> bool {
        self.scope.contains(collection)
    }

    fn check_scope(&self, collection: &str) -> CoreResult<()> {
        if self.in_scope(collection) {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "collection {collection} is not part of this transaction"
            )))
        }
    }

    fn collection(&self, name: &str) -> CoreResult<&CollectionState> {
        self.check_scope(name)?;
        self.staged
            .get(name)
            .or_else(|| self.base.get(name))
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    fn collection_mut(&mut self, name: &str) -> CoreResult<&mut CollectionState> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(CoreError::invalid_operation(format!(
                "write to {name} in a read-only transaction"
            )));
        }
        self.check_scope(name)?;
        if !self.staged.contains_key(name) {
            let state = self
                .base
                .get(name)
                .ok_or_else(|| CoreError::collection_not_found(name))?;
            self.staged.insert(name.to_string(), state.clone());
        }
        self.staged
            .get_mut(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    fn write(&mut self, collection: &str, record: Value, overwrite: bool) -> CoreResult<RecordKey> {
        let state = self.collection_mut(collection)?;
        let mut prepared = state.prepare_put(record, overwrite)?;
        let batch = std::mem::take(&mut prepared.batch);
        let key = state.apply_put(prepared);
        self.batch.extend(batch);
        Ok(key)
    }

    /// Inserts a record; fails on an existing key.
    pub fn add(&mut self, collection: &str, record: Value) -> CoreResult<RecordKey> {
        self.write(collection, record, false)
    }

    /// Inserts or replaces a record.
    pub fn put(&mut self, collection: &str, record: Value) -> CoreResult<RecordKey> {
        self.write(collection, record, true)
    }

    /// Returns a record, or `None` if absent.
    pub fn get(&self, collection: &str, key: impl Into<RecordKey>) -> CoreResult<Option<Value>> {
        Ok(self.collection(collection)?.get(&key.into()).cloned())
    }

    /// Returns every record in key order.
    pub fn get_all(&self, collection: &str) -> CoreResult<Vec<Value>> {
        Ok(self.collection(collection)?.values().cloned().collect())
    }

    /// Removes a record if present.
    pub fn delete(&mut self, collection: &str, key: impl Into<RecordKey>) -> CoreResult<()> {
        let key = key.into();
        let state = self.collection_mut(collection)?;
        if let Some(batch) = state.prepare_delete(&key) {
            state.apply_delete(&key);
            self.batch.extend(batch);
        }
        Ok(())
    }

    /// Removes every record of a collection.
    pub fn clear(&mut self, collection: &str) -> CoreResult<()> {
        let state = self.collection_mut(collection)?;
        let batch = state.prepare_clear();
        state.apply_clear();
        self.batch.extend(batch);
        Ok(())
    }

    /// Returns the number of records.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        Ok(self.collection(collection)?.len())
    }

    /// Returns records whose index value equals `value`.
    pub fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> CoreResult<Vec<Value>> {
        self.collection(collection)?.query_index(index, value)
    }

    /// Splits into the batch to commit and the collections it replaces.
    pub(crate) fn into_parts(self) -> (WriteBatch, BTreeMap<String, CollectionState>) {
        (self.batch, self.staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CollectionDef;
    use serde_json::json;

    fn collections() -> BTreeMap<String, CollectionState> {
        let mut map = BTreeMap::new();
        for name in ["a", "b"] {
            map.insert(
                name.to_string(),
                CollectionState::new(name, CollectionDef::new("id").auto_increment()),
            );
        }
        map
    }

    fn scope(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn writes_are_staged_and_batched() {
        let base = collections();
        let mut txn = Transaction::new(&base, scope(&["a"]), TransactionMode::ReadWrite);

        txn.add("a", json!({"v": 1})).unwrap();
        txn.add("a", json!({"v": 2})).unwrap();
        txn.delete("a", 1).unwrap();

        assert_eq!(txn.count("a").unwrap(), 1);
        assert_eq!(base["a"].len(), 0);

        let (batch, staged) = txn.into_parts();
        assert!(batch.len() >= 3);
        assert_eq!(staged["a"].len(), 1);
    }

    #[test]
    fn read_only_rejects_writes() {
        let base = collections();
        let mut txn = Transaction::new(&base, scope(&["a"]), TransactionMode::ReadOnly);
        assert!(txn.get_all("a").unwrap().is_empty());
        let err = txn.add("a", json!({})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn out_of_scope_access_fails() {
        let base = collections();
        let mut txn = Transaction::new(&base, scope(&["a"]), TransactionMode::ReadWrite);
        assert!(txn.count("b").is_err());
        assert!(txn.clear("b").is_err());
        assert!(!txn.in_scope("b"));
    }

    #[test]
    fn delete_absent_key_adds_nothing() {
        let base = collections();
        let mut txn = Transaction::new(&base, scope(&["a"]), TransactionMode::ReadWrite);
        txn.delete("a", 42).unwrap();
        let (batch, _) = txn.into_parts();
        assert!(batch.is_empty());
    }
}
