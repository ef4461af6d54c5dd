//! # DeskStore Core
//!
//! Local persistence and query layer for the DeskStore dashboard.
//!
//! This crate provides:
//! - A declarative [`Schema`] registry with additive, versioned upgrades
//! - The [`Database`] engine: lifecycle, CRUD, index lookups, transactions
//! - An in-memory query layer (filter, search, sort, paginate)
//! - JSON snapshot backup and atomic restore
//! - Per-collection statistics
//!
//! Records are JSON objects ([`serde_json::Value`]); persistence is delegated
//! to a [`deskstore_storage::StorageBackend`].
//!
//! ```rust
//! use deskstore_core::{Database, QueryOptions, Schema, SortDirection};
//! use serde_json::json;
//!
//! let db = Database::open_in_memory(Schema::enterprise()).unwrap();
//! db.add("tasks", json!({"title": "write docs", "status": "pending"})).unwrap();
//! db.add("tasks", json!({"title": "ship", "status": "completed"})).unwrap();
//!
//! let done = db.query_by_index("tasks", "status", &json!("completed")).unwrap();
//! assert_eq!(done.len(), 1);
//!
//! let newest_first = QueryOptions::new()
//!     .order_by("title", SortDirection::Descending)
//!     .limit(1);
//! let page = db.get_all_with("tasks", &newest_first).unwrap();
//! assert_eq!(page[0]["title"], "write docs");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
mod collection;
mod config;
mod database;
mod error;
mod index;
mod key;
pub mod query;
pub mod schema;
mod stats;
mod transaction;

pub use backup::{BackupInfo, RestoreStats, Snapshot};
pub use config::Config;
pub use database::{Database, DatabaseState};
pub use error::{CoreError, CoreResult};
pub use key::RecordKey;
pub use query::{QueryOptions, SortDirection};
pub use schema::{CollectionDef, IndexDef, Schema};
pub use stats::{CollectionStats, DatabaseStats};
pub use transaction::{Transaction, TransactionMode};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
