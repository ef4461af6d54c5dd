//! Schema registry.
//!
//! A [`Schema`] declares every collection the database holds: its primary key
//! field, whether keys are generated, and its secondary indexes. Schemas are
//! plain data: build them in code or load them from JSON.
//!
//! ```json
//! {
//!   "name": "EnterpriseManagementDB",
//!   "version": 1,
//!   "collections": {
//!     "settings": { "key_path": "key", "indexes": { "category": "category" } }
//!   }
//! }
//! ```
//!
//! ## Versioning
//!
//! Opening a store whose persisted version is lower than the schema version
//! runs an additive upgrade: missing collections are created and missing
//! indexes are added to existing collections. Nothing is ever dropped.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A secondary index over one field, or over several fields (compound).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexFields", into = "IndexFields")]
pub struct IndexDef {
    /// Indexed field names, in order.
    pub fields: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IndexFields {
    One(String),
    Many(Vec<String>),
}

impl From<IndexFields> for IndexDef {
    fn from(fields: IndexFields) -> Self {
        match fields {
            IndexFields::One(field) => Self {
                fields: vec![field],
            },
            IndexFields::Many(fields) => Self { fields },
        }
    }
}

impl From<IndexDef> for IndexFields {
    fn from(def: IndexDef) -> Self {
        if def.fields.len() == 1 {
            let mut fields = def.fields;
            Self::One(fields.remove(0))
        } else {
            Self::Many(def.fields)
        }
    }
}

impl IndexDef {
    /// Creates an index over a single field.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            fields: vec![name.into()],
        }
    }

    /// Creates a compound index over several fields.
    pub fn compound<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the index spans more than one field.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.fields.len() > 1
    }
}

/// Definition of a single collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    /// Name of the primary key field.
    pub key_path: String,
    /// Whether missing keys are generated.
    #[serde(default)]
    pub auto_increment: bool,
    /// Secondary indexes by name.
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexDef>,
}

impl CollectionDef {
    /// Creates a collection keyed by `key_path` with caller-supplied keys.
    pub fn new(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            auto_increment: false,
            indexes: BTreeMap::new(),
        }
    }

    /// Makes keys engine-assigned when a record has none.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, def: IndexDef) -> Self {
        self.indexes.insert(name.into(), def);
        self
    }

    /// Adds a single-field index.
    #[must_use]
    pub fn index_on(self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.index(name, IndexDef::field(field))
    }
}

/// The full set of collections, with a version number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Database name.
    pub name: String,
    /// Schema version; increase it whenever collections or indexes change.
    pub version: u32,
    /// Collections by name.
    pub collections: BTreeMap<String, CollectionDef>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            collections: BTreeMap::new(),
        }
    }

    /// Adds a collection.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>, def: CollectionDef) -> Self {
        self.collections.insert(name.into(), def);
        self
    }

    /// Returns the definition of a collection.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.get(name)
    }

    /// Parses a schema from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns a JSON error for malformed input, or the validation error.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Checks that the schema can be opened.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] describing the first problem.
    pub fn validate(&self) -> CoreResult<()> {
        if self.version == 0 {
            return Err(CoreError::invalid_operation(
                "schema version must be at least 1",
            ));
        }
        for (name, def) in &self.collections {
            if name.is_empty() {
                return Err(CoreError::invalid_operation("collection name is empty"));
            }
            if def.key_path.is_empty() {
                return Err(CoreError::invalid_operation(format!(
                    "collection {name} has an empty key path"
                )));
            }
            for (index, index_def) in &def.indexes {
                if index_def.fields.is_empty() || index_def.fields.iter().any(String::is_empty) {
                    return Err(CoreError::invalid_operation(format!(
                        "index {name}.{index} has an empty field"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The built-in enterprise dashboard schema.
    #[must_use]
    pub fn enterprise() -> Self {
        Self::new("EnterpriseManagementDB", 1)
            .collection(
                "users",
                CollectionDef::new("id")
                    .auto_increment()
                    .index_on("email", "email")
                    .index_on("department", "department")
                    .index_on("role", "role"),
            )
            .collection(
                "tasks",
                CollectionDef::new("id")
                    .auto_increment()
                    .index_on("assignee", "assigneeId")
                    .index_on("status", "status")
                    .index_on("priority", "priority")
                    .index_on("dueDate", "dueDate"),
            )
            .collection(
                "customers",
                CollectionDef::new("id")
                    .auto_increment()
                    .index_on("name", "name")
                    .index_on("email", "email")
                    .index_on("status", "status")
                    .index_on("createdAt", "createdAt"),
            )
            .collection(
                "projects",
                CollectionDef::new("id")
                    .auto_increment()
                    .index_on("name", "name")
                    .index_on("status", "status")
                    .index_on("manager", "managerId")
                    .index_on("startDate", "startDate"),
            )
            .collection(
                "notifications",
                CollectionDef::new("id")
                    .auto_increment()
                    .index_on("userId", "userId")
                    .index_on("type", "type")
                    .index_on("isRead", "isRead")
                    .index_on("timestamp", "timestamp"),
            )
            .collection(
                "settings",
                CollectionDef::new("key").index_on("category", "category"),
            )
            .collection(
                "auditLogs",
                CollectionDef::new("id")
                    .auto_increment()
                    .index_on("userId", "userId")
                    .index_on("action", "action")
                    .index_on("timestamp", "timestamp")
                    .index_on("resource", "resource"),
            )
    }
}
