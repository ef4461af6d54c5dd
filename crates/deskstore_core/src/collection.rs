//! In-memory state of one collection.
//!
//! Writes happen in two steps: `prepare_*` validates the write and builds the
//! backend batch without touching the collection, then `apply_*` updates the
//! records, indexes and key generator once the batch is committed.

use crate::error::{CoreError, CoreResult};
use crate::index::FieldIndex;
use crate::key::RecordKey;
use crate::schema::{CollectionDef, IndexDef};
use deskstore_storage::{Table, WriteBatch};
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata key prefix holding collection definitions.
pub(crate) const DEF_META_PREFIX: &str = "collection:";
/// Metadata key prefix holding the next auto-increment key.
pub(crate) const SEQ_META_PREFIX: &str = "autoinc:";

/// A validated write, ready to be committed.
#[derive(Debug)]
pub(crate) struct PreparedPut {
    pub key: RecordKey,
    pub record: Value,
    pub batch: WriteBatch,
    next_id: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct CollectionState {
    name: String,
    def: CollectionDef,
    records: BTreeMap<RecordKey, Value>,
    indexes: BTreeMap<String, FieldIndex>,
    /// Next auto-increment key. Never decreases, not even on clear.
    next_id: i64,
}

impl CollectionState {
    pub(crate) fn new(name: &str, def: CollectionDef) -> Self {
        let indexes = def
            .indexes
            .iter()
            .map(|(index, index_def)| (index.clone(), FieldIndex::new(index_def.clone())))
            .collect();
        Self {
            name: name.to_string(),
            def,
            records: BTreeMap::new(),
            indexes,
            next_id: 1,
        }
    }

    /// Rebuilds a collection from its persisted table.
    pub(crate) fn load(
        name: &str,
        def: CollectionDef,
        table: &Table,
        next_id: i64,
    ) -> CoreResult<Self> {
        let mut state = Self::new(name, def);
        state.next_id = next_id.max(1);
        for (key_bytes, value_bytes) in table {
            let key = RecordKey::decode(key_bytes)?;
            let record: Value = serde_json::from_slice(value_bytes)?;
            state.index_record(&key, &record);
            state.records.insert(key, record);
        }
        Ok(state)
    }

    /// Writes the definition of this collection to a batch.
    pub(crate) fn stage_definition(&self, batch: &mut WriteBatch) -> CoreResult<()> {
        batch.set_meta(
            format!("{DEF_META_PREFIX}{}", self.name),
            serde_json::to_vec(&self.def)?,
        );
        Ok(())
    }

    /// Adds an index, back-filling it from the current records.
    pub(crate) fn add_index(&mut self, name: &str, def: IndexDef) {
        let index = FieldIndex::build(def.clone(), &self.records);
        self.indexes.insert(name.to_string(), index);
        self.def.indexes.insert(name.to_string(), def);
    }

    pub(crate) fn def(&self) -> &CollectionDef {
        &self.def
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn get(&self, key: &RecordKey) -> Option<&Value> {
        self.records.get(key)
    }

    /// All records in key order.
    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.records.values()
    }

    /// Records matching an index value, in key order.
    pub(crate) fn query_index(&self, index: &str, value: &Value) -> CoreResult<Vec<Value>> {
        let index = self
            .indexes
            .get(index)
            .ok_or_else(|| CoreError::index_not_found(&self.name, index))?;
        Ok(index
            .lookup(value)
            .filter_map(|key| self.records.get(key))
            .cloned()
            .collect())
    }

    /// Validates an insert (`overwrite == false`) or upsert and builds its batch.
    pub(crate) fn prepare_put(
        &self,
        mut record: Value,
        overwrite: bool,
    ) -> CoreResult<PreparedPut> {
        let key_path = &self.def.key_path;
        let fields = record
            .as_object_mut()
            .ok_or_else(|| CoreError::invalid_key(&self.name, "record must be a JSON object"))?;

        let key = match fields.get(key_path).filter(|v| !v.is_null()) {
            Some(value) => RecordKey::from_value(value).ok_or_else(|| {
                CoreError::invalid_key(
                    &self.name,
                    format!("{key_path} must be an integer or a string, got {value}"),
                )
            })?,
            None if self.def.auto_increment => {
                let key = RecordKey::Int(self.next_id);
                fields.insert(key_path.clone(), key.to_value());
                key
            }
            None => {
                return Err(CoreError::invalid_key(
                    &self.name,
                    format!("record has no {key_path} and keys are not generated"),
                ))
            }
        };

        if !overwrite && self.records.contains_key(&key) {
            return Err(CoreError::DuplicateKey {
                collection: self.name.clone(),
                key: key.to_string(),
            });
        }

        let next_id = match key {
            RecordKey::Int(i) if self.def.auto_increment && i >= self.next_id => {
                i.saturating_add(1)
            }
            _ => self.next_id,
        };

        let mut batch = WriteBatch::new();
        batch.put(&self.name, key.encode(), serde_json::to_vec(&record)?);
        if next_id != self.next_id {
            batch.set_meta(
                format!("{SEQ_META_PREFIX}{}", self.name),
                next_id.to_string().into_bytes(),
            );
        }

        Ok(PreparedPut {
            key,
            record,
            batch,
            next_id,
        })
    }

    pub(crate) fn apply_put(&mut self, prepared: PreparedPut) -> RecordKey {
        let PreparedPut {
            key,
            record,
            next_id,
            ..
        } = prepared;
        if let Some(old) = self.records.remove(&key) {
            self.unindex_record(&key, &old);
        }
        self.index_record(&key, &record);
        self.records.insert(key.clone(), record);
        self.next_id = next_id;
        key
    }

    /// Builds the batch for a delete, or `None` if the key is absent.
    pub(crate) fn prepare_delete(&self, key: &RecordKey) -> Option<WriteBatch> {
        self.records.contains_key(key).then(|| {
            let mut batch = WriteBatch::new();
            batch.delete(&self.name, key.encode());
            batch
        })
    }

    pub(crate) fn apply_delete(&mut self, key: &RecordKey) {
        if let Some(old) = self.records.remove(key) {
            self.unindex_record(key, &old);
        }
    }

    pub(crate) fn prepare_clear(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.clear(&self.name);
        batch
    }

    pub(crate) fn apply_clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    fn index_record(&mut self, key: &RecordKey, record: &Value) {
        for index in self.indexes.values_mut() {
            index.insert(key, record);
        }
    }

    fn unindex_record(&mut self, key: &RecordKey, record: &Value) {
        for index in self.indexes.values_mut() {
            index.remove(key, record);
        }
    }

    #[cfg(test)]
    pub(crate) fn index_len(&self, index: &str) -> usize {
        self.indexes.get(index).map_or(0, FieldIndex::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tasks() -> CollectionState {
        CollectionState::new(
            "tasks",
            CollectionDef::new("id")
                .auto_increment()
                .index_on("status", "status"),
        )
    }

    fn insert(state: &mut CollectionState, record: Value) -> CoreResult<RecordKey> {
        let prepared = state.prepare_put(record, false)?;
        Ok(state.apply_put(prepared))
    }

    #[test]
    fn auto_increment_assigns_and_writes_key() {
        let mut state = tasks();
        let k1 = insert(&mut state, json!({"title": "a"})).unwrap();
        let k2 = insert(&mut state, json!({"id": null, "title": "b"})).unwrap();

        assert_eq!(k1, RecordKey::Int(1));
        assert_eq!(k2, RecordKey::Int(2));
        assert_eq!(state.get(&k2).unwrap()["id"], json!(2));
    }

    #[test]
    fn explicit_keys_advance_generator() {
        let mut state = tasks();
        insert(&mut state, json!({"id": 10})).unwrap();
        let next = insert(&mut state, json!({})).unwrap();
        assert_eq!(next, RecordKey::Int(11));
    }

    #[test]
    fn prepare_does_not_mutate() {
        let state = tasks();
        let prepared = state.prepare_put(json!({"status": "open"}), false).unwrap();
        assert_eq!(prepared.key, RecordKey::Int(1));
        assert_eq!(prepared.batch.len(), 2);
        assert_eq!(state.len(), 0);
        assert_eq!(state.index_len("status"), 0);
    }

    #[test]
    fn duplicate_key_rejected_on_insert_only() {
        let mut state = tasks();
        insert(&mut state, json!({"id": 1, "status": "open"})).unwrap();

        let err = state.prepare_put(json!({"id": 1}), false).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));

        let prepared = state
            .prepare_put(json!({"id": 1, "status": "done"}), true)
            .unwrap();
        state.apply_put(prepared);
        assert_eq!(state.len(), 1);
        assert!(state.query_index("status", &json!("open")).unwrap().is_empty());
        assert_eq!(state.query_index("status", &json!("done")).unwrap().len(), 1);
    }

    #[test]
    fn manual_keys_are_required_without_auto_increment() {
        let state = CollectionState::new("settings", CollectionDef::new("key"));
        let err = state.prepare_put(json!({"value": 1}), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKey { .. }));

        let err = state.prepare_put(json!({"key": [1]}), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKey { .. }));

        let err = state.prepare_put(json!("scalar"), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKey { .. }));
    }

    #[test]
    fn clear_keeps_generator() {
        let mut state = tasks();
        insert(&mut state, json!({"status": "open"})).unwrap();
        state.apply_clear();
        assert_eq!(state.len(), 0);
        assert_eq!(state.index_len("status"), 0);
        assert_eq!(insert(&mut state, json!({})).unwrap(), RecordKey::Int(2));
    }

    #[test]
    fn delete_absent_key_has_no_batch() {
        let mut state = tasks();
        assert!(state.prepare_delete(&RecordKey::Int(1)).is_none());
        insert(&mut state, json!({"status": "open"})).unwrap();
        assert!(state.prepare_delete(&RecordKey::Int(1)).is_some());
        state.apply_delete(&RecordKey::Int(1));
        assert_eq!(state.index_len("status"), 0);
    }

    #[test]
    fn add_index_backfills() {
        let mut state = tasks();
        insert(&mut state, json!({"priority": "high"})).unwrap();
        insert(&mut state, json!({"priority": "low"})).unwrap();
        state.add_index("priority", IndexDef::field("priority"));

        assert_eq!(state.query_index("priority", &json!("high")).unwrap().len(), 1);
        assert!(state.def().indexes.contains_key("priority"));
    }

    #[test]
    fn unknown_index_is_not_found() {
        let state = tasks();
        let err = state.query_index("nope", &json!(1)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "index", .. }));
    }
}
