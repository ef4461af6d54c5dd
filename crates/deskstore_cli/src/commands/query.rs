//! Query command implementation.

use super::open_existing;
use deskstore_core::{Database, QueryOptions, Schema, SortDirection};
use serde_json::Value;
use std::path::Path;

/// A collection read assembled from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Collection to read.
    pub collection: String,
    /// Index name and raw lookup value.
    pub index: Option<(String, String)>,
    /// Sort field.
    pub order_by: Option<String>,
    /// Sort descending instead of ascending.
    pub descending: bool,
    /// Records to skip.
    pub offset: usize,
    /// Maximum records to return.
    pub limit: Option<usize>,
    /// Case-insensitive search text.
    pub search: Option<String>,
    /// Fields the search looks at.
    pub fields: Vec<String>,
}

impl QueryRequest {
    fn direction(&self) -> SortDirection {
        if self.descending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    fn options(&self) -> QueryOptions {
        let mut options = QueryOptions::new().offset(self.offset);
        if let Some(text) = &self.search {
            options = options.search(text.clone(), self.fields.clone());
        }
        if let Some(field) = &self.order_by {
            options = options.order_by(field.clone(), self.direction());
        }
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        options
    }
}

/// Interprets a command-line value as JSON, falling back to a string.
///
/// `2` is a number, `false` a boolean, `completed` the string "completed".
/// Quote a value (`'"2"'`) to look up the string form of a number.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Executes `request` against an open database.
pub fn execute(
    db: &Database,
    request: &QueryRequest,
) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let records = match &request.index {
        Some((index, raw)) => {
            let matched = db.query_by_index(&request.collection, index, &parse_value(raw))?;
            request.options().apply(matched)
        }
        None => db.get_all_with(&request.collection, &request.options())?,
    };
    Ok(records)
}

/// Runs the query command, printing matches as a JSON array.
pub fn run(
    path: &Path,
    schema: Schema,
    request: &QueryRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path, schema)?;
    let records = execute(&db, request)?;
    db.close()?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    eprintln!("{} record(s)", records.len());

    Ok(())
}
