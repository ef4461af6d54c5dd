//! Secondary indexes.

use crate::key::{integral, RecordKey};
use crate::schema::IndexDef;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Equality index from field value(s) to primary keys.
///
/// Index values are compared through their canonical JSON text, so `"1"` and
/// `1` are different values while `1.0` and `1` are the same. Records missing
/// an indexed field (or holding `null` there) are not indexed. A compound
/// index holds the JSON array of its field values and skips records missing
/// any of them.
#[derive(Debug, Clone)]
pub(crate) struct FieldIndex {
    def: IndexDef,
    entries: HashMap<String, BTreeSet<RecordKey>>,
    count: usize,
}

impl FieldIndex {
    pub(crate) fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: HashMap::new(),
            count: 0,
        }
    }

    /// Builds an index over existing records.
    pub(crate) fn build<'a, I>(def: IndexDef, records: I) -> Self
    where
        I: IntoIterator<Item = (&'a RecordKey, &'a Value)>,
    {
        let mut index = Self::new(def);
        for (key, record) in records {
            index.insert(key, record);
        }
        index
    }

    /// Canonical lookup text of a query value.
    ///
    /// Numbers compare by value, so `1` and `1.0` share an entry.
    pub(crate) fn lookup_text(value: &Value) -> String {
        normalize(value).to_string()
    }

    /// Extracts the index value of a record, if it has one.
    fn value_of(&self, record: &Value) -> Option<String> {
        let present = |field: &String| record.get(field).filter(|v| !v.is_null());
        match self.def.fields.as_slice() {
            [field] => present(field).map(Self::lookup_text),
            fields => {
                let values: Option<Vec<Value>> =
                    fields.iter().map(|f| present(f).cloned()).collect();
                values.map(|v| Self::lookup_text(&Value::Array(v)))
            }
        }
    }

    pub(crate) fn insert(&mut self, key: &RecordKey, record: &Value) {
        if let Some(value) = self.value_of(record) {
            if self.entries.entry(value).or_default().insert(key.clone()) {
                self.count += 1;
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &RecordKey, record: &Value) {
        if let Some(value) = self.value_of(record) {
            if let Some(set) = self.entries.get_mut(&value) {
                if set.remove(key) {
                    self.count -= 1;
                    if set.is_empty() {
                        self.entries.remove(&value);
                    }
                }
            }
        }
    }

    /// Primary keys of records whose index value equals `value`, in key order.
    pub(crate) fn lookup(&self, value: &Value) -> impl Iterator<Item = &RecordKey> {
        self.entries
            .get(&Self::lookup_text(value))
            .into_iter()
            .flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Number(n) => integral(n).map_or_else(|| value.clone(), Value::from),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}
