//! # DeskStore Storage
//!
//! Storage backend trait and implementations for DeskStore.
//!
//! Backends persist **opaque tables**: each table maps key bytes to value
//! bytes. They never interpret records, keys or index definitions; the engine
//! in `deskstore_core` owns all of that and hands the backend fully prepared
//! [`WriteBatch`]es.
//!
//! ## Design Principles
//!
//! - A committed batch is applied entirely or not at all
//! - `open` returns the full persisted [`StoreImage`]
//! - Backends must be `Send + Sync`; they are shared behind the engine's locks
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral databases
//! - [`FileBackend`] - Append-only framed log inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use deskstore_storage::{InMemoryBackend, StorageBackend, WriteBatch};
//!
//! let backend = InMemoryBackend::new();
//! backend.open().unwrap();
//!
//! let mut batch = WriteBatch::new();
//! batch.create_table("users");
//! batch.put("users", b"k1".to_vec(), b"{}".to_vec());
//! backend.commit(&batch).unwrap();
//!
//! let image = backend.open().unwrap();
//! assert_eq!(image.tables["users"].len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod file;
mod frame;
mod memory;

pub use backend::StorageBackend;
pub use batch::{Mutation, StoreImage, Table, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileOptions};
pub use memory::InMemoryBackend;
