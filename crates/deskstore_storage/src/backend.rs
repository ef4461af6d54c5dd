//! Storage backend trait definition.

use crate::batch::{StoreImage, WriteBatch};
use crate::error::StorageResult;
use std::sync::Arc;

/// A pluggable persistence backend for DeskStore.
///
/// Backends store opaque tables of key and value bytes. The engine decides
/// what the bytes mean; backends only guarantee that a batch is persisted
/// atomically and that `open` returns everything committed so far.
///
/// # Invariants
///
/// - `open` returns the image produced by applying every committed batch,
///   in commit order
/// - `commit` is all-or-nothing: on error nothing of the batch is visible
///   to a later `open`
/// - `commit` before `open` (or after `close`) fails with
///   [`StorageError::Closed`](crate::StorageError::Closed)
/// - Backends must be `Send + Sync`; methods take `&self`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Opens the backend and returns the persisted image.
    ///
    /// Opening an already open backend returns the current image.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is locked by another process, is
    /// corrupted, or an I/O error occurs.
    fn open(&self) -> StorageResult<StoreImage>;

    /// Persists a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed, the batch references an
    /// unknown table, the write would exceed the quota, or an I/O error occurs.
    fn commit(&self, batch: &WriteBatch) -> StorageResult<()>;

    /// Releases the backend. Closing a closed backend is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if pending data cannot be flushed.
    fn close(&self) -> StorageResult<()>;

    /// Returns the number of bytes the backend currently occupies.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn open(&self) -> StorageResult<StoreImage> {
        (**self).open()
    }

    fn commit(&self, batch: &WriteBatch) -> StorageResult<()> {
        (**self).commit(batch)
    }

    fn close(&self) -> StorageResult<()> {
        (**self).close()
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }
}
