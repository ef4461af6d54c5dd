//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::batch::{StoreImage, WriteBatch};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// This backend keeps the store image in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// Data survives `close` followed by `open` on the same instance, which makes
/// it usable for reopen and upgrade tests.
///
/// # Example
///
/// ```rust
/// use deskstore_storage::{InMemoryBackend, StorageBackend, WriteBatch};
///
/// let backend = InMemoryBackend::with_quota(16);
/// backend.open().unwrap();
///
/// let mut batch = WriteBatch::new();
/// batch.create_table("t");
/// batch.put("t", vec![0; 32], vec![]);
/// assert!(backend.commit(&batch).unwrap_err().is_quota_exceeded());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    image: RwLock<StoreImage>,
    open: RwLock<bool>,
    quota: Option<u64>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory backend that rejects writes growing the image
    /// past `limit` bytes.
    ///
    /// Each commit is applied to a copy of the image and swapped in only if
    /// it fits, so commits cost O(image size). Without a quota batches are
    /// applied in place.
    #[must_use]
    pub fn with_quota(limit: u64) -> Self {
        Self {
            quota: Some(limit),
            ..Self::default()
        }
    }

    /// Creates a backend holding a pre-existing image.
    ///
    /// Useful for testing upgrade scenarios.
    #[must_use]
    pub fn with_image(image: StoreImage) -> Self {
        Self {
            image: RwLock::new(image),
            ..Self::default()
        }
    }

    /// Returns a copy of the current image.
    #[must_use]
    pub fn image(&self) -> StoreImage {
        self.image.read().clone()
    }

    /// Returns true if the backend is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.open.read()
    }
}

impl StorageBackend for InMemoryBackend {
    fn open(&self) -> StorageResult<StoreImage> {
        *self.open.write() = true;
        Ok(self.image.read().clone())
    }

    fn commit(&self, batch: &WriteBatch) -> StorageResult<()> {
        if !self.is_open() {
            return Err(StorageError::Closed);
        }

        let mut image = self.image.write();
        let Some(limit) = self.quota else {
            return image.apply(batch);
        };

        let mut next = image.clone();
        next.apply(batch)?;
        let requested = next.size_bytes();
        if requested > limit {
            return Err(StorageError::QuotaExceeded { requested, limit });
        }
        *image = next;
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        *self.open.write() = false;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.image.read().size_bytes())
    }
}
