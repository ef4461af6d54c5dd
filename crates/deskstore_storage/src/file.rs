//! File-based storage backend for persistent storage.
//!
//! The backend owns a directory:
//!
//! ```text
//! <dir>/
//! ├─ LOCK          # Advisory lock, held while open
//! └─ store.log     # Append-only log of framed CBOR entries
//! ```
//!
//! Every commit appends one frame holding the batch. [`FileBackend::compact`]
//! rewrites the log as a single frame holding the whole image.

use crate::backend::StorageBackend;
use crate::batch::{StoreImage, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::frame;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";
const LOG_TEMP: &str = "store.log.tmp";

/// Options for a [`FileBackend`].
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
    /// Whether to `fsync` the log after every commit (safer but slower).
    pub sync_on_commit: bool,
    /// Maximum size of the log in bytes (`None` = unbounded).
    pub max_size: Option<u64>,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            max_size: None,
        }
    }
}

impl FileOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the maximum log size.
    #[must_use]
    pub const fn max_size(mut self, limit: u64) -> Self {
        self.max_size = Some(limit);
        self
    }
}

#[derive(Serialize)]
enum EntryRef<'a> {
    Batch(&'a WriteBatch),
    Image(&'a StoreImage),
}

#[derive(Deserialize)]
enum Entry {
    Batch(WriteBatch),
    Image(StoreImage),
}

fn encode_entry(entry: &EntryRef<'_>) -> StorageResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(entry, &mut payload)
        .map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(frame::encode(&payload))
}

/// State held while the backend is open.
#[derive(Debug)]
struct OpenLog {
    lock: File,
    log: File,
    size: u64,
    tables: BTreeSet<String>,
}

/// A file-based storage backend.
///
/// Data survives process restarts. Only one process may hold the directory
/// open at a time; a second `open` from another handle fails with
/// [`StorageError::Locked`].
///
/// # Durability
///
/// A commit is durable once it returns when `sync_on_commit` is set. A frame
/// torn by a crash is discarded on the next open.
///
/// # Example
///
/// ```no_run
/// use deskstore_storage::{FileBackend, FileOptions, StorageBackend, WriteBatch};
/// use std::path::Path;
///
/// let backend = FileBackend::new(Path::new("data"), FileOptions::default());
/// backend.open().unwrap();
///
/// let mut batch = WriteBatch::new();
/// batch.create_table("users");
/// backend.commit(&batch).unwrap();
/// backend.close().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    options: FileOptions,
    state: Mutex<Option<OpenLog>>,
}

impl FileBackend {
    /// Creates a backend for the given directory. Nothing is touched on disk
    /// until [`StorageBackend::open`] is called.
    #[must_use]
    pub fn new(dir: &Path, options: FileOptions) -> Self {
        Self {
            dir: dir.to_path_buf(),
            options,
            state: Mutex::new(None),
        }
    }

    /// Returns the backend directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Rewrites the log as a single image frame.
    ///
    /// The new log is written to a temporary file and renamed over the old
    /// one, so a crash during compaction leaves the previous log intact.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the backend is not open, or an
    /// I/O or codec error.
    pub fn compact(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(StorageError::Closed)?;

        let (image, _) = replay(&mut open.log)?;
        let frame = encode_entry(&EntryRef::Image(&image))?;

        let temp_path = self.dir.join(LOG_TEMP);
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(&frame)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, self.log_path())?;

        open.log = open_log(&self.log_path())?;
        tracing::debug!(before = open.size, after = frame.len(), "compacted store log");
        open.size = frame.len() as u64;
        Ok(())
    }
}

fn open_log(path: &Path) -> StorageResult<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// Rebuilds the image from the log, truncating a torn tail.
///
/// Returns the image and the length of the valid log prefix.
fn replay(log: &mut File) -> StorageResult<(StoreImage, u64)> {
    let mut data = Vec::new();
    log.seek(SeekFrom::Start(0))?;
    log.read_to_end(&mut data)?;

    let decoded = frame::decode_all(&data)?;
    if decoded.torn_tail {
        tracing::warn!(
            valid_len = decoded.valid_len,
            file_len = data.len(),
            "discarding torn frame at end of store log"
        );
        log.set_len(decoded.valid_len)?;
        log.sync_all()?;
    }

    let mut image = StoreImage::new();
    for payload in &decoded.payloads {
        let entry: Entry = ciborium::from_reader(payload.as_slice())
            .map_err(|e| StorageError::Codec(e.to_string()))?;
        match entry {
            Entry::Batch(batch) => image
                .apply(&batch)
                .map_err(|e| StorageError::Corrupted(format!("replay failed: {e}")))?,
            Entry::Image(snapshot) => image = snapshot,
        }
    }

    Ok((image, decoded.valid_len))
}

impl StorageBackend for FileBackend {
    fn open(&self) -> StorageResult<StoreImage> {
        let mut state = self.state.lock();

        if let Some(open) = state.as_mut() {
            let (image, _) = replay(&mut open.log)?;
            return Ok(image);
        }

        if !self.dir.exists() {
            if self.options.create_if_missing {
                fs::create_dir_all(&self.dir)?;
            } else {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", self.dir.display()),
                )));
            }
        }

        let lock = open_log(&self.dir.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut log = open_log(&self.log_path())?;
        let (image, size) = replay(&mut log)?;
        tracing::debug!(
            path = %self.dir.display(),
            size,
            version = image.version,
            "opened store log"
        );

        *state = Some(OpenLog {
            lock,
            log,
            size,
            tables: image.tables.keys().cloned().collect(),
        });
        Ok(image)
    }

    fn commit(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(StorageError::Closed)?;

        batch.check_tables(|name| open.tables.contains(name))?;
        let frame = encode_entry(&EntryRef::Batch(batch))?;

        if let Some(limit) = self.options.max_size {
            let requested = open.size + frame.len() as u64;
            if requested > limit {
                return Err(StorageError::QuotaExceeded { requested, limit });
            }
        }

        open.log.seek(SeekFrom::Start(open.size))?;
        let written = open.log.write_all(&frame).and_then(|()| {
            open.log.flush()?;
            if self.options.sync_on_commit {
                open.log.sync_data()?;
            }
            Ok(())
        });
        if let Err(e) = written {
            // Drop whatever part of the frame reached the file. If that fails
            // too, the log is closed and the next open discards the torn frame.
            if let Err(truncate) = open.log.set_len(open.size) {
                tracing::error!(
                    error = %truncate,
                    "failed to truncate store log after write error"
                );
                *state = None;
            }
            return Err(e.into());
        }

        open.size += frame.len() as u64;
        open.tables
            .extend(batch.created_tables().map(str::to_string));
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if let Some(open) = state.take() {
            open.log.sync_all()?;
            open.lock.unlock()?;
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        match self.state.lock().as_ref() {
            Some(open) => Ok(open.size),
            None => match fs::metadata(self.log_path()) {
                Ok(meta) => Ok(meta.len()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
                Err(e) => Err(e.into()),
            },
        }
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
