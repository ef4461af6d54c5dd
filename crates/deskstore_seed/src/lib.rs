//! # DeskStore Seed
//!
//! Sample data and test utilities for DeskStore.
//!
//! This crate provides:
//! - [`Seeder`]: loads the fixed dashboard dataset and appends random tasks
//! - The fixed dataset itself ([`fixtures::dataset`]), anchored to a
//!   caller-chosen instant
//! - Test database helpers ([`TestDatabase`], [`with_temp_db`])
//! - Random record generators and proptest strategies
//!
//! ## Usage
//!
//! ```rust
//! use deskstore_seed::prelude::*;
//! use serde_json::json;
//!
//! let db = TestDatabase::memory().unwrap();
//! Seeder::new(&db).seed_all().unwrap();
//!
//! let done = db.query_by_index("tasks", "status", &json!("completed")).unwrap();
//! assert_eq!(done.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
mod seeder;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::{dataset, with_temp_db, TestDatabase, COLLECTIONS};
    pub use crate::generators::*;
    pub use crate::seeder::{RandomDataOptions, SeedReport, SeedStats, Seeder};
}

pub use fixtures::{with_temp_db, TestDatabase, COLLECTIONS};
pub use seeder::{RandomDataOptions, SeedReport, SeedStats, Seeder};
