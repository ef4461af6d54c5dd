//! In-memory query layer.
//!
//! Queries post-process a record set fetched from the engine:
//! filter (and search), then a stable sort, then offset and limit. Nothing is
//! pushed down to storage. With no options set, [`QueryOptions::apply`]
//! returns its input unchanged.
//!
//! The stages are also exposed as free functions ([`filter`], [`sort`],
//! [`paginate`]) for callers that hold records already.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Sort direction for [`QueryOptions::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Options for [`Database::get_all_with`](crate::Database::get_all_with).
#[derive(Default)]
pub struct QueryOptions {
    filter: Option<Predicate>,
    search: Option<(String, Vec<String>)>,
    order_by: Option<(String, SortDirection)>,
    offset: usize,
    limit: Option<usize>,
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("search", &self.search)
            .field("order_by", &self.order_by)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

impl QueryOptions {
    /// Creates options that return every record in stored order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only records matching `predicate`.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Keeps only records where one of `fields` contains `text`,
    /// ignoring case. With no fields, every top-level field is searched.
    #[must_use]
    pub fn search<I, S>(mut self, text: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search = Some((
            text.into().to_lowercase(),
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Sorts by a top-level field. Ties keep their previous order.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Skips the first `offset` records after sorting.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns at most `limit` records.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &Value) -> bool {
        if let Some(predicate) = &self.filter {
            if !predicate(record) {
                return false;
            }
        }
        match &self.search {
            Some((text, fields)) => matches_search(record, text, fields),
            None => true,
        }
    }

    /// Runs filter, sort and pagination over `records`.
    #[must_use]
    pub fn apply(&self, records: Vec<Value>) -> Vec<Value> {
        let mut records = filter(records, |r| self.matches(r));
        if let Some((field, direction)) = &self.order_by {
            sort(&mut records, field, *direction);
        }
        paginate(records, self.offset, self.limit)
    }
}

fn matches_search(record: &Value, text: &str, fields: &[String]) -> bool {
    let contains = |value: &Value| match value {
        Value::String(s) => s.to_lowercase().contains(text),
        Value::Null => false,
        other => other.to_string().to_lowercase().contains(text),
    };
    if fields.is_empty() {
        record
            .as_object()
            .is_some_and(|fields| fields.values().any(contains))
    } else {
        fields
            .iter()
            .filter_map(|field| record.get(field))
            .any(contains)
    }
}

/// Keeps records matching `predicate`, preserving order.
pub fn filter(records: Vec<Value>, predicate: impl Fn(&Value) -> bool) -> Vec<Value> {
    records.into_iter().filter(|r| predicate(r)).collect()
}

/// Stable sort by a top-level field.
pub fn sort(records: &mut [Value], field: &str, direction: SortDirection) {
    records.sort_by(|a, b| {
        let ord = compare_values(a.get(field), b.get(field));
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

/// Skips `offset` records, then keeps at most `limit`.
#[must_use]
pub fn paginate(records: Vec<Value>, offset: usize, limit: Option<usize>) -> Vec<Value> {
    records
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    }
}

/// Total order over optional field values.
///
/// Missing and `null` sort first, then booleans, numbers, strings, and finally
/// arrays and objects (by their JSON text).
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == 4 && rank(b) == 4 => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn titles(records: &[Value]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r["title"].as_str().unwrap_or_default())
            .collect()
    }

    fn sample() -> Vec<Value> {
        vec![
            json!({"title": "b", "priority": 2, "status": "open"}),
            json!({"title": "a", "priority": 1, "status": "done"}),
            json!({"title": "c", "priority": 2, "status": "open"}),
            json!({"title": "d", "status": "open"}),
        ]
    }

    #[test]
    fn no_options_is_identity() {
        let records = sample();
        assert_eq!(QueryOptions::new().apply(records.clone()), records);
    }

    #[test]
    fn sort_is_stable_in_both_directions() {
        let asc = QueryOptions::new()
            .order_by("priority", SortDirection::Ascending)
            .apply(sample());
        assert_eq!(titles(&asc), vec!["d", "a", "b", "c"]);

        let desc = QueryOptions::new()
            .order_by("priority", SortDirection::Descending)
            .apply(sample());
        assert_eq!(titles(&desc), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn filter_then_sort_then_paginate() {
        let page = QueryOptions::new()
            .filter(|r| r["status"] == "open")
            .order_by("title", SortDirection::Descending)
            .offset(1)
            .limit(1)
            .apply(sample());
        assert_eq!(titles(&page), vec!["c"]);
    }

    #[test]
    fn offset_past_end_is_empty() {
        assert!(QueryOptions::new().offset(10).apply(sample()).is_empty());
        assert!(QueryOptions::new().limit(0).apply(sample()).is_empty());
    }

    #[test]
    fn search_is_case_insensitive() {
        let records = vec![
            json!({"name": "Acme Corp", "email": "sales@acme.test"}),
            json!({"name": "Globex", "email": "info@globex.test"}),
        ];
        let hits = QueryOptions::new()
            .search("ACME", ["name"])
            .apply(records.clone());
        assert_eq!(hits.len(), 1);

        let hits = QueryOptions::new()
            .search("globex", Vec::<String>::new())
            .apply(records);
        assert_eq!(hits[0]["name"], "Globex");
    }

    #[test]
    fn mixed_types_order() {
        let values = [
            json!("a"),
            json!(1),
            json!(true),
            Value::Null,
            json!([1]),
        ];
        let mut ranks: Vec<_> = values.iter().map(Some).collect();
        ranks.push(None);
        ranks.sort_by(|a, b| compare_values(*a, *b));
        assert_eq!(ranks[2], Some(&json!(true)));
        assert_eq!(ranks[3], Some(&json!(1)));
        assert_eq!(ranks[4], Some(&json!("a")));
        assert_eq!(ranks[5], Some(&json!([1])));
    }

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!(
            compare_values(Some(&json!(9)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!(1.5)), Some(&json!(1))),
            Ordering::Greater
        );
    }

    proptest! {
        #[test]
        fn pagination_matches_slice(
            len in 0usize..20,
            offset in 0usize..25,
            limit in proptest::option::of(0usize..25),
        ) {
            let records: Vec<Value> = (0..len).map(|i| json!({"i": i})).collect();
            let page = paginate(records.clone(), offset, limit);
            let start = offset.min(len);
            let end = limit.map_or(len, |l| (start + l).min(len));
            prop_assert_eq!(page, records[start..end].to_vec());
        }
    }
}
