//! JSON snapshots for backup and restore.
//!
//! ## Snapshot Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "timestamp": "2024-05-01T12:00:00.000Z",
//!   "data": {
//!     "users": [{ "id": 1, "name": "Ada" }],
//!     "settings": []
//!   }
//! }
//! ```
//!
//! `version` is the schema version of the database that produced the
//! snapshot. Restoring into a database with an older schema is refused.
//! `data` maps collection names to arrays of record objects; every other
//! shape is rejected before anything is touched.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A point-in-time export of every collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Schema version of the exporting database.
    pub version: u32,
    /// When the snapshot was taken (RFC 3339, UTC).
    pub timestamp: String,
    /// Records by collection name.
    pub data: BTreeMap<String, Vec<Value>>,
}

impl Snapshot {
    /// Creates a snapshot stamped with `taken_at`.
    #[must_use]
    pub fn new(version: u32, taken_at: DateTime<Utc>, data: BTreeMap<String, Vec<Value>>) -> Self {
        Self {
            version,
            timestamp: taken_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }

    /// Parses and validates a snapshot.
    ///
    /// `version` defaults to 0 and `timestamp` to an empty string when
    /// absent; `data` is required.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBackupFormat`] when the input is not JSON,
    /// is not an object, lacks `data`, or `data` is not an object of arrays of
    /// objects.
    pub fn parse(json: &str) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| CoreError::invalid_backup(format!("not valid JSON: {e}")))?;
        let Value::Object(root) = value else {
            return Err(CoreError::invalid_backup("snapshot must be a JSON object"));
        };

        let version = match root.get("version") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| CoreError::invalid_backup(format!("invalid version: {v}")))?,
        };

        let timestamp = match root.get("timestamp") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(ts)) => ts.clone(),
            Some(other) => {
                return Err(CoreError::invalid_backup(format!(
                    "timestamp must be a string, got {other}"
                )))
            }
        };

        let data = match root.get("data") {
            Some(Value::Object(data)) => parse_data(data)?,
            Some(_) => {
                return Err(CoreError::invalid_backup(
                    "data must map collection names to record arrays",
                ))
            }
            None => return Err(CoreError::invalid_backup("missing data field")),
        };

        Ok(Self {
            version,
            timestamp,
            data,
        })
    }

    /// Serializes the snapshot.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if serialization fails.
    pub fn to_json(&self, pretty: bool) -> CoreResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Total number of records across collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    /// Summarizes the snapshot.
    #[must_use]
    pub fn info(&self) -> BackupInfo {
        BackupInfo {
            version: self.version,
            timestamp: self.timestamp.clone(),
            collections: self
                .data
                .iter()
                .map(|(name, records)| (name.clone(), records.len()))
                .collect(),
            record_count: self.record_count(),
        }
    }
}

fn parse_data(data: &Map<String, Value>) -> CoreResult<BTreeMap<String, Vec<Value>>> {
    let mut out = BTreeMap::new();
    for (name, records) in data {
        let Value::Array(records) = records else {
            return Err(CoreError::invalid_backup(format!(
                "data.{name} must be an array"
            )));
        };
        if let Some(pos) = records.iter().position(|r| !r.is_object()) {
            return Err(CoreError::invalid_backup(format!(
                "data.{name}[{pos}] is not an object"
            )));
        }
        out.insert(name.clone(), records.clone());
    }
    Ok(out)
}

/// Summary of a validated snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    /// Schema version recorded in the snapshot.
    pub version: u32,
    /// Timestamp recorded in the snapshot.
    pub timestamp: String,
    /// Record count per collection.
    pub collections: BTreeMap<String, usize>,
    /// Total number of records.
    pub record_count: usize,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreStats {
    /// Records removed from the database before re-inserting.
    pub records_cleared: usize,
    /// Records inserted from the snapshot.
    pub records_restored: usize,
    /// Records inserted per collection.
    pub collections: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn parse_valid_snapshot() {
        let snapshot = Snapshot::parse(
            r#"{"version": 1, "timestamp": "2024-01-01T00:00:00Z",
                "data": {"users": [{"id": 1}], "settings": []}}"#,
        )
        .unwrap();

        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.record_count(), 1);
        assert_eq!(snapshot.info().collections["settings"], 0);
    }

    #[test]
    fn only_data_is_required() {
        let snapshot = Snapshot::parse(r#"{"data": {}}"#).unwrap();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.timestamp.is_empty());
    }

    #[test]
    fn rejects_malformed_input() {
        for input in [
            "not json",
            "[]",
            r#"{"version": 1}"#,
            r#"{"data": "not-an-object-map"}"#,
            r#"{"data": {"users": {"id": 1}}}"#,
            r#"{"data": {"users": [1, 2]}}"#,
            r#"{"version": -1, "data": {}}"#,
            r#"{"timestamp": 5, "data": {}}"#,
        ] {
            let err = Snapshot::parse(input).unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidBackupFormat { .. }),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn serializes_with_millisecond_timestamp() {
        let taken_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut data = BTreeMap::new();
        data.insert("users".to_string(), vec![json!({"id": 1})]);
        let snapshot = Snapshot::new(3, taken_at, data);

        let json = snapshot.to_json(false).unwrap();
        assert!(json.contains(r#""timestamp":"2024-05-01T12:00:00.000Z""#));
        assert_eq!(Snapshot::parse(&json).unwrap(), snapshot);
    }
}
