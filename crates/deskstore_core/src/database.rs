//! Database facade and lifecycle.

use crate::backup::{BackupInfo, RestoreStats, Snapshot};
use crate::collection::{CollectionState, DEF_META_PREFIX, SEQ_META_PREFIX};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::key::RecordKey;
use crate::query::QueryOptions;
use crate::schema::{CollectionDef, Schema};
use crate::stats::{CollectionStats, DatabaseStats};
use crate::transaction::{Transaction, TransactionMode};
use chrono::Utc;
use deskstore_storage::{
    FileBackend, FileOptions, InMemoryBackend, StorageBackend, StoreImage, WriteBatch,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    /// Never opened, or the last open failed.
    Unopened,
    /// An open is in progress.
    Opening,
    /// Ready for use.
    Open,
    /// Closed; can be opened again.
    Closed,
}

/// Loaded contents of an open database.
#[derive(Debug)]
pub(crate) struct Store {
    version: u32,
    collections: BTreeMap<String, CollectionState>,
}

impl Store {
    fn collection(&self, name: &str) -> CoreResult<&CollectionState> {
        self.collections
            .get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    fn collection_mut(&mut self, name: &str) -> CoreResult<&mut CollectionState> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }
}

/// The main database handle.
///
/// `Database` is the single gateway to a store. It provides:
/// - Lifecycle management (`open`, `close`, schema upgrades)
/// - Record CRUD and index lookups
/// - Scoped multi-collection transactions
/// - Backup, restore and statistics
///
/// A handle is `Send + Sync`; share it by reference or `Arc`. Reads run in
/// parallel, writes and transactions are serialized.
///
/// # Lifecycle
///
/// `open` is idempotent and concurrent calls are coalesced: one physical open
/// runs while the other callers wait and observe its outcome. A failed open
/// leaves the handle [`DatabaseState::Unopened`] so it can be retried. With
/// [`Config::auto_open`] enabled (the default) every operation opens the
/// handle on first use.
///
/// ```rust
/// use deskstore_core::{Database, DatabaseState, Schema};
/// use serde_json::json;
///
/// let db = Database::open_in_memory(Schema::enterprise()).unwrap();
/// let key = db.add("users", json!({"name": "Ada", "role": "admin"})).unwrap();
/// assert!(db.get("users", key).unwrap().is_some());
///
/// db.close().unwrap();
/// assert_eq!(db.state(), DatabaseState::Closed);
/// ```
pub struct Database {
    config: Config,
    schema: Schema,
    backend: Box<dyn StorageBackend>,
    /// Serializes open and close. Holds the error of the last failed open.
    lifecycle: Mutex<Option<String>>,
    /// Number of finished open attempts.
    open_attempts: AtomicU64,
    state: RwLock<DatabaseState>,
    store: RwLock<Option<Store>>,
}

impl Database {
    /// Creates an unopened handle over `backend`.
    pub fn new(schema: Schema, backend: impl StorageBackend + 'static) -> Self {
        Self::with_config(schema, backend, Config::default())
    }

    /// Creates an unopened handle with custom configuration.
    pub fn with_config(
        schema: Schema,
        backend: impl StorageBackend + 'static,
        config: Config,
    ) -> Self {
        Self {
            config,
            schema,
            backend: Box::new(backend),
            lifecycle: Mutex::new(None),
            open_attempts: AtomicU64::new(0),
            state: RwLock::new(DatabaseState::Unopened),
            store: RwLock::new(None),
        }
    }

    /// Opens an ephemeral in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseUnavailable`] if the schema is invalid.
    pub fn open_in_memory(schema: Schema) -> CoreResult<Self> {
        let db = Self::new(schema, InMemoryBackend::new());
        db.open()?;
        Ok(db)
    }

    /// Opens (or creates) a file-backed database in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseUnavailable`] if the directory is locked
    /// by another process, the log is corrupted, or the schema is invalid.
    pub fn open_path(path: &Path, schema: Schema) -> CoreResult<Self> {
        let db = Self::new(schema, FileBackend::new(path, FileOptions::default()));
        db.open()?;
        Ok(db)
    }

    /// Returns the schema this handle was built with.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> DatabaseState {
        *self.state.read()
    }

    /// Returns true if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == DatabaseState::Open
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens the database, upgrading the store if the schema is newer.
    ///
    /// Opening an open database is a no-op. Callers that arrive while another
    /// open is in flight wait for it and share its result.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseUnavailable`] if the schema is invalid,
    /// the backend cannot be opened, the store was written by a newer schema
    /// version, or the upgrade cannot be persisted.
    pub fn open(&self) -> CoreResult<()> {
        let seen = self.open_attempts.load(Ordering::SeqCst);
        if self.is_open() {
            return Ok(());
        }

        let mut last_failure = self.lifecycle.lock();
        if self.is_open() {
            return Ok(());
        }
        if self.open_attempts.load(Ordering::SeqCst) != seen {
            if let Some(message) = last_failure.as_ref() {
                return Err(CoreError::unavailable(message.clone()));
            }
        }

        *self.state.write() = DatabaseState::Opening;
        let result = self.load();
        self.open_attempts.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(store) => {
                info!(
                    name = %self.schema.name,
                    version = store.version,
                    collections = store.collections.len(),
                    "database opened"
                );
                *self.store.write() = Some(store);
                *self.state.write() = DatabaseState::Open;
                *last_failure = None;
                Ok(())
            }
            Err(err) => {
                let message = match err {
                    CoreError::DatabaseUnavailable { message } => message,
                    other => other.to_string(),
                };
                warn!(name = %self.schema.name, error = %message, "database open failed");
                if let Err(close_err) = self.backend.close() {
                    warn!(error = %close_err, "closing backend after failed open");
                }
                *self.state.write() = DatabaseState::Unopened;
                *last_failure = Some(message.clone());
                Err(CoreError::unavailable(message))
            }
        }
    }

    /// Reads the backend image and applies any pending schema upgrade.
    fn load(&self) -> CoreResult<Store> {
        self.schema.validate()?;
        let image = self.backend.open()?;

        if image.version > self.schema.version {
            return Err(CoreError::unavailable(format!(
                "store version {} is newer than schema version {}",
                image.version, self.schema.version
            )));
        }

        let mut collections = BTreeMap::new();
        for (name, table) in &image.tables {
            let def = self.stored_def(&image, name)?;
            let next_id = stored_next_id(&image, name)?;
            collections.insert(
                name.clone(),
                CollectionState::load(name, def, table, next_id)?,
            );
        }

        let mut version = image.version;
        if image.version < self.schema.version {
            let batch = self.upgrade(&mut collections)?;
            self.backend.commit(&batch)?;
            info!(
                from = image.version,
                to = self.schema.version,
                "store upgraded"
            );
            version = self.schema.version;
        }

        Ok(Store {
            version,
            collections,
        })
    }

    fn stored_def(&self, image: &StoreImage, name: &str) -> CoreResult<CollectionDef> {
        match image.meta.get(&format!("{DEF_META_PREFIX}{name}")) {
            Some(bytes) => Ok(serde_json::from_slice(bytes)?),
            None => self
                .schema
                .get(name)
                .cloned()
                .ok_or_else(|| CoreError::corrupted(format!("table {name} has no definition"))),
        }
    }

    /// Creates missing collections and indexes. Nothing is removed.
    fn upgrade(
        &self,
        collections: &mut BTreeMap<String, CollectionState>,
    ) -> CoreResult<WriteBatch> {
        let mut batch = WriteBatch::new();
        for (name, def) in &self.schema.collections {
            match collections.get_mut(name) {
                None => {
                    let state = CollectionState::new(name, def.clone());
                    batch.create_table(name);
                    state.stage_definition(&mut batch)?;
                    debug!(collection = %name, "created collection");
                    collections.insert(name.clone(), state);
                }
                Some(state) => {
                    let missing: Vec<_> = def
                        .indexes
                        .iter()
                        .filter(|(index, _)| !state.def().indexes.contains_key(*index))
                        .map(|(index, index_def)| (index.clone(), index_def.clone()))
                        .collect();
                    if missing.is_empty() {
                        continue;
                    }
                    for (index, index_def) in missing {
                        debug!(collection = %name, index = %index, "added index");
                        state.add_index(&index, index_def);
                    }
                    state.stage_definition(&mut batch)?;
                }
            }
        }
        batch.set_version(self.schema.version);
        Ok(batch)
    }

    /// Closes the database. Closing a closed database is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to flush.
    pub fn close(&self) -> CoreResult<()> {
        let _guard = self.lifecycle.lock();
        if self.state() != DatabaseState::Open {
            return Ok(());
        }
        self.store.write().take();
        *self.state.write() = DatabaseState::Closed;
        self.backend.close()?;
        info!(name = %self.schema.name, "database closed");
        Ok(())
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else if self.config.auto_open {
            self.open()
        } else {
            Err(CoreError::unavailable("database is not open"))
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&Store) -> CoreResult<T>) -> CoreResult<T> {
        self.ensure_open()?;
        let guard = self.store.read();
        let store = guard
            .as_ref()
            .ok_or_else(|| CoreError::unavailable("database was closed"))?;
        f(store)
    }

    fn with_store_mut<T>(&self, f: impl FnOnce(&mut Store) -> CoreResult<T>) -> CoreResult<T> {
        self.ensure_open()?;
        let mut guard = self.store.write();
        let store = guard
            .as_mut()
            .ok_or_else(|| CoreError::unavailable("database was closed"))?;
        f(store)
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Inserts a new record and returns its key.
    ///
    /// In auto-increment collections a record without a key (or with a `null`
    /// key) gets the next generated key, written into the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateKey`] if the key exists,
    /// [`CoreError::InvalidKey`] if the record is not an object or has no
    /// usable key, and [`CoreError::QuotaExceeded`] if the backend is full.
    pub fn add(&self, collection: &str, record: Value) -> CoreResult<RecordKey> {
        self.write_record(collection, record, false)
    }

    /// Inserts or replaces a record and returns its key.
    ///
    /// # Errors
    ///
    /// Same as [`Database::add`], except that existing keys are replaced.
    pub fn put(&self, collection: &str, record: Value) -> CoreResult<RecordKey> {
        self.write_record(collection, record, true)
    }

    fn write_record(
        &self,
        collection: &str,
        record: Value,
        overwrite: bool,
    ) -> CoreResult<RecordKey> {
        self.with_store_mut(|store| {
            let state = store.collection_mut(collection)?;
            let prepared = state.prepare_put(record, overwrite)?;
            self.backend.commit(&prepared.batch)?;
            Ok(state.apply_put(prepared))
        })
    }

    /// Returns a record, or `None` if no record has `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown collection.
    pub fn get(&self, collection: &str, key: impl Into<RecordKey>) -> CoreResult<Option<Value>> {
        let key = key.into();
        self.with_store(|store| Ok(store.collection(collection)?.get(&key).cloned()))
    }

    /// Returns a record that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the collection or record is missing.
    pub fn get_required(&self, collection: &str, key: impl Into<RecordKey>) -> CoreResult<Value> {
        let key = key.into();
        self.get(collection, key.clone())?
            .ok_or_else(|| CoreError::record_not_found(collection, &key))
    }

    /// Returns every record in key order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown collection.
    pub fn get_all(&self, collection: &str) -> CoreResult<Vec<Value>> {
        self.with_store(|store| Ok(store.collection(collection)?.values().cloned().collect()))
    }

    /// Returns records refined by `options` (filter, sort, pagination).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown collection.
    pub fn get_all_with(&self, collection: &str, options: &QueryOptions) -> CoreResult<Vec<Value>> {
        Ok(options.apply(self.get_all(collection)?))
    }

    /// Removes a record. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown collection, or the
    /// backend error if the delete cannot be persisted.
    pub fn delete(&self, collection: &str, key: impl Into<RecordKey>) -> CoreResult<()> {
        let key = key.into();
        self.with_store_mut(|store| {
            let state = store.collection_mut(collection)?;
            if let Some(batch) = state.prepare_delete(&key) {
                self.backend.commit(&batch)?;
                state.apply_delete(&key);
            }
            Ok(())
        })
    }

    /// Removes every record of a collection. Generated keys are not reused.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown collection, or the
    /// backend error if the clear cannot be persisted.
    pub fn clear(&self, collection: &str) -> CoreResult<()> {
        self.with_store_mut(|store| {
            let state = store.collection_mut(collection)?;
            self.backend.commit(&state.prepare_clear())?;
            state.apply_clear();
            Ok(())
        })
    }

    /// Returns the number of records in a collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown collection.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        self.with_store(|store| Ok(store.collection(collection)?.len()))
    }

    /// Returns every record whose index value equals `value`, in key order.
    ///
    /// Compound indexes take a JSON array holding one value per field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown collection or index.
    pub fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> CoreResult<Vec<Value>> {
        self.with_store(|store| store.collection(collection)?.query_index(index, value))
    }

    /// Returns the names of all stored collections.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseUnavailable`] if the database cannot be opened.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        self.with_store(|store| Ok(store.collections.keys().cloned().collect()))
    }

    /// Returns the schema version of the open store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseUnavailable`] if the database cannot be opened.
    pub fn version(&self) -> CoreResult<u32> {
        self.with_store(|store| Ok(store.version))
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Runs `f` as one atomic unit over `collections`.
    ///
    /// Every write made through the [`Transaction`] is committed in a single
    /// backend batch once `f` returns `Ok`. If `f` fails, a write is attempted
    /// in a read-only transaction, a collection outside `collections` is
    /// touched, or the commit fails, nothing is applied.
    ///
    /// The write lock is held while `f` runs: use the transaction handle, not
    /// this `Database`, inside `f`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] wrapping the failure, or
    /// [`CoreError::DatabaseUnavailable`] if the database cannot be opened.
    ///
    /// # Example
    ///
    /// ```rust
    /// use deskstore_core::{Database, Schema, TransactionMode};
    /// use serde_json::json;
    ///
    /// let db = Database::open_in_memory(Schema::enterprise()).unwrap();
    /// let result = db.run_transaction(&["users", "auditLogs"], TransactionMode::ReadWrite, |txn| {
    ///     let user = txn.add("users", json!({"name": "Ada"}))?;
    ///     txn.add("auditLogs", json!({"action": "create", "userId": user.to_value()}))?;
    ///     txn.add("users", json!({"id": 1}))?; // duplicate, rolls back both writes
    ///     Ok(())
    /// });
    ///
    /// assert!(result.is_err());
    /// assert_eq!(db.count("users").unwrap(), 0);
    /// assert_eq!(db.count("auditLogs").unwrap(), 0);
    /// ```
    pub fn run_transaction<T, F>(
        &self,
        collections: &[&str],
        mode: TransactionMode,
        f: F,
    ) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        self.ensure_open()?;
        let mut guard = self.store.write();
        let store = guard
            .as_mut()
            .ok_or_else(|| CoreError::unavailable("database was closed"))?;

        let mut scope = BTreeSet::new();
        for name in collections {
            store.collection(name).map_err(CoreError::transaction_failed)?;
            scope.insert((*name).to_string());
        }

        let mut txn = Transaction::new(&store.collections, scope, mode);
        let value = match f(&mut txn) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                return Err(match err {
                    CoreError::Transaction { .. } => err,
                    other => CoreError::transaction_failed(other),
                });
            }
        };

        let (batch, staged) = txn.into_parts();
        if !batch.is_empty() {
            self.backend
                .commit(&batch)
                .map_err(|e| CoreError::transaction_failed(e.into()))?;
        }
        store.collections.extend(staged);
        Ok(value)
    }

    // ========================================================================
    // Backup and Restore
    // ========================================================================

    /// Exports every collection as a JSON [`Snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseUnavailable`] if the database cannot be opened.
    pub fn backup(&self) -> CoreResult<String> {
        let snapshot = self.with_store(|store| {
            let data = store
                .collections
                .iter()
                .map(|(name, state)| (name.clone(), state.values().cloned().collect()))
                .collect();
            Ok(Snapshot::new(store.version, Utc::now(), data))
        })?;
        info!(records = snapshot.record_count(), "backup created");
        snapshot.to_json(self.config.pretty_backups)
    }

    /// Replaces the contents of every collection with a snapshot.
    ///
    /// The snapshot is validated before anything changes. The clear and the
    /// re-insert (with `add` semantics) then run as one transaction, so a
    /// failure leaves the database as it was.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidBackupFormat`] for malformed input or a snapshot
    ///   from a newer schema version
    /// - [`CoreError::NotFound`] if the snapshot names an unknown collection
    /// - [`CoreError::Transaction`] if a record cannot be inserted
    pub fn restore(&self, json: &str) -> CoreResult<RestoreStats> {
        let snapshot = Snapshot::parse(json)?;
        let (version, names) = self.with_store(|store| {
            Ok((
                store.version,
                store.collections.keys().cloned().collect::<Vec<_>>(),
            ))
        })?;

        if snapshot.version > version {
            return Err(CoreError::invalid_backup(format!(
                "snapshot version {} is newer than database version {version}",
                snapshot.version
            )));
        }
        if let Some(unknown) = snapshot.data.keys().find(|name| !names.contains(name)) {
            return Err(CoreError::collection_not_found(unknown.as_str()));
        }

        let scope: Vec<&str> = names.iter().map(String::as_str).collect();
        let stats = self.run_transaction(&scope, TransactionMode::ReadWrite, |txn| {
            let mut stats = RestoreStats::default();
            for name in &names {
                stats.records_cleared += txn.count(name)?;
                txn.clear(name)?;
            }
            for (name, records) in &snapshot.data {
                for record in records {
                    txn.add(name, record.clone())?;
                }
                stats.records_restored += records.len();
                stats.collections.insert(name.clone(), records.len());
            }
            Ok(stats)
        })?;

        info!(
            cleared = stats.records_cleared,
            restored = stats.records_restored,
            "restore completed"
        );
        Ok(stats)
    }

    /// Validates a snapshot without restoring it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBackupFormat`] for malformed input.
    pub fn validate_backup(&self, json: &str) -> CoreResult<BackupInfo> {
        Ok(Snapshot::parse(json)?.info())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Returns record counts and serialized sizes per collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseUnavailable`] if the database cannot be opened.
    pub fn stats(&self) -> CoreResult<DatabaseStats> {
        self.with_store(|store| {
            let mut stats = DatabaseStats::default();
            for (name, state) in &store.collections {
                let records: Vec<&Value> = state.values().collect();
                let size = serde_json::to_vec(&records)?.len() as u64;
                stats.insert(
                    name,
                    CollectionStats {
                        count: records.len(),
                        size,
                    },
                );
            }
            Ok(stats)
        })
    }
}

fn stored_next_id(image: &StoreImage, name: &str) -> CoreResult<i64> {
    match image.meta.get(&format!("{SEQ_META_PREFIX}{name}")) {
        None => Ok(1),
        Some(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::corrupted(format!("bad key generator for {name}"))),
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.schema.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDef;
    use deskstore_storage::{StorageError, StorageResult};
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    /// Backend wrapper that counts opens and can be made to fail them.
    #[derive(Debug, Default)]
    struct ProbeBackend {
        inner: InMemoryBackend,
        opens: AtomicU64,
        fail_open: AtomicBool,
        open_delay: Option<Duration>,
    }

    impl StorageBackend for ProbeBackend {
        fn open(&self) -> StorageResult<StoreImage> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.open_delay {
                std::thread::sleep(delay);
            }
            if self.fail_open.load(Ordering::SeqCst) {
                return Err(StorageError::Locked);
            }
            self.inner.open()
        }

        fn commit(&self, batch: &WriteBatch) -> StorageResult<()> {
            self.inner.commit(batch)
        }

        fn close(&self) -> StorageResult<()> {
            self.inner.close()
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
    }

    fn create_db() -> Database {
        Database::open_in_memory(Schema::enterprise()).unwrap()
    }

    #[test]
    fn open_in_memory() {
        let db = create_db();
        assert!(db.is_open());
        assert_eq!(db.version().unwrap(), 1);
        assert_eq!(db.collection_names().unwrap().len(), 7);
    }

    #[test]
    fn operations_auto_open() {
        let db = Database::new(Schema::enterprise(), InMemoryBackend::new());
        assert_eq!(db.state(), DatabaseState::Unopened);
        assert_eq!(db.count("users").unwrap(), 0);
        assert_eq!(db.state(), DatabaseState::Open);
    }

    #[test]
    fn auto_open_disabled_fails_eagerly() {
        let db = Database::with_config(
            Schema::enterprise(),
            InMemoryBackend::new(),
            Config::new().auto_open(false),
        );
        let err = db.count("users").unwrap_err();
        assert!(matches!(err, CoreError::DatabaseUnavailable { .. }));

        db.open().unwrap();
        assert_eq!(db.count("users").unwrap(), 0);
    }

    #[test]
    fn open_is_idempotent_and_close_reopens() {
        let backend = Arc::new(ProbeBackend::default());
        let db = Database::new(Schema::enterprise(), Arc::clone(&backend));
        db.open().unwrap();
        db.open().unwrap();
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);

        db.add("users", json!({"name": "Ada"})).unwrap();
        db.close().unwrap();
        db.close().unwrap();
        assert_eq!(db.state(), DatabaseState::Closed);

        assert_eq!(db.count("users").unwrap(), 1);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_opens_are_coalesced() {
        let backend = Arc::new(ProbeBackend {
            open_delay: Some(Duration::from_millis(50)),
            ..ProbeBackend::default()
        });
        let db = Arc::new(Database::new(Schema::enterprise(), Arc::clone(&backend)));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    db.open()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
        assert!(db.is_open());
    }

    #[test]
    fn concurrent_opens_share_failure() {
        let backend = Arc::new(ProbeBackend {
            open_delay: Some(Duration::from_millis(200)),
            ..ProbeBackend::default()
        });
        backend.fail_open.store(true, Ordering::SeqCst);
        let db = Arc::new(Database::new(Schema::enterprise(), Arc::clone(&backend)));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    db.open()
                })
            })
            .collect();
        for handle in handles {
            let err = handle.join().unwrap().unwrap_err();
            assert!(matches!(err, CoreError::DatabaseUnavailable { .. }));
        }

        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
        assert_eq!(db.state(), DatabaseState::Unopened);
    }

    #[test]
    fn failed_open_is_retryable() {
        let backend = Arc::new(ProbeBackend::default());
        backend.fail_open.store(true, Ordering::SeqCst);
        let db = Database::new(Schema::enterprise(), Arc::clone(&backend));

        let err = db.open().unwrap_err();
        assert!(matches!(err, CoreError::DatabaseUnavailable { .. }));
        assert_eq!(db.state(), DatabaseState::Unopened);
        assert!(matches!(
            db.get("users", 1),
            Err(CoreError::DatabaseUnavailable { .. })
        ));

        backend.fail_open.store(false, Ordering::SeqCst);
        db.open().unwrap();
        assert!(db.is_open());
    }

    #[test]
    fn invalid_schema_is_unavailable() {
        let db = Database::new(Schema::new("bad", 0), InMemoryBackend::new());
        assert!(matches!(
            db.open(),
            Err(CoreError::DatabaseUnavailable { .. })
        ));
    }

    #[test]
    fn add_get_delete() {
        let db = create_db();
        let record = json!({"key": "theme", "category": "ui", "value": "dark"});
        let key = db.add("settings", record.clone()).unwrap();
        assert_eq!(key, RecordKey::from("theme"));
        assert_eq!(db.get("settings", "theme").unwrap(), Some(record));

        db.delete("settings", "theme").unwrap();
        db.delete("settings", "theme").unwrap();
        assert_eq!(db.get("settings", "theme").unwrap(), None);
        assert!(matches!(
            db.get_required("settings", "theme"),
            Err(CoreError::NotFound { kind: "record", .. })
        ));
    }

    #[test]
    fn add_rejects_duplicates_put_replaces() {
        let db = create_db();
        db.add("settings", json!({"key": "lang", "value": "en"})).unwrap();
        assert!(matches!(
            db.add("settings", json!({"key": "lang", "value": "fr"})),
            Err(CoreError::DuplicateKey { .. })
        ));

        db.put("settings", json!({"key": "lang", "value": "fr"})).unwrap();
        db.put("settings", json!({"key": "lang", "value": "fr"})).unwrap();
        assert_eq!(db.count("settings").unwrap(), 1);
        assert_eq!(db.get_required("settings", "lang").unwrap()["value"], "fr");
    }

    #[test]
    fn unknown_collection_is_not_found() {
        let db = create_db();
        assert!(matches!(
            db.count("nope"),
            Err(CoreError::NotFound { kind: "collection", .. })
        ));
        assert!(matches!(
            db.add("nope", json!({})),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn index_tracks_updates() {
        let db = create_db();
        let key = db
            .add("tasks", json!({"title": "a", "status": "pending"}))
            .unwrap();
        db.put("tasks", json!({"id": key.to_value(), "title": "a", "status": "completed"}))
            .unwrap();

        assert!(db
            .query_by_index("tasks", "status", &json!("pending"))
            .unwrap()
            .is_empty());
        assert_eq!(
            db.query_by_index("tasks", "status", &json!("completed"))
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(
            db.query_by_index("tasks", "nope", &json!(1)),
            Err(CoreError::NotFound { kind: "index", .. })
        ));
    }

    #[test]
    fn integral_floats_act_as_integers() {
        let db = create_db();
        let key = db.add("users", json!({"id": 2.0, "name": "Ada"})).unwrap();
        assert_eq!(key, RecordKey::Int(2));
        assert!(db.get("users", 2).unwrap().is_some());

        db.add("tasks", json!({"title": "a", "assigneeId": 1.0}))
            .unwrap();
        let assigned = db
            .query_by_index("tasks", "assignee", &json!(1))
            .unwrap();
        assert_eq!(assigned.len(), 1);
    }

    #[test]
    fn clear_keeps_key_generator() {
        let db = create_db();
        db.add("tasks", json!({})).unwrap();
        db.add("tasks", json!({})).unwrap();
        db.clear("tasks").unwrap();
        assert_eq!(db.count("tasks").unwrap(), 0);
        assert_eq!(db.add("tasks", json!({})).unwrap(), RecordKey::Int(3));
    }

    #[test]
    fn quota_errors_are_typed() {
        let db = Database::new(Schema::enterprise(), InMemoryBackend::with_quota(4096));
        db.open().unwrap();
        let big = "x".repeat(8192);
        let err = db.add("users", json!({"bio": big})).unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded { .. }));
        assert_eq!(db.count("users").unwrap(), 0);
    }

    #[test]
    fn transaction_commits_atomically() {
        let db = create_db();
        let keys = db
            .run_transaction(&["users", "tasks"], TransactionMode::ReadWrite, |txn| {
                let user = txn.add("users", json!({"name": "Ada"}))?;
                let task = txn.add("tasks", json!({"assigneeId": user.to_value()}))?;
                assert_eq!(txn.count("tasks")?, 1);
                Ok((user, task))
            })
            .unwrap();

        assert_eq!(keys, (RecordKey::Int(1), RecordKey::Int(1)));
        assert_eq!(
            db.query_by_index("tasks", "assignee", &json!(1)).unwrap().len(),
            1
        );
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = create_db();
        db.add("users", json!({"name": "existing"})).unwrap();

        let err = db
            .run_transaction(&["users"], TransactionMode::ReadWrite, |txn| {
                txn.clear("users")?;
                txn.add("users", json!({"id": 5}))?;
                txn.add("users", json!({"id": 5}))?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(
            err.transaction_cause(),
            Some(CoreError::DuplicateKey { .. })
        ));
        assert_eq!(db.count("users").unwrap(), 1);
        assert_eq!(db.add("users", json!({})).unwrap(), RecordKey::Int(2));
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let db = create_db();
        let err = db
            .run_transaction(&["users"], TransactionMode::ReadOnly, |txn| {
                txn.add("users", json!({}))
            })
            .unwrap_err();
        assert!(matches!(
            err.transaction_cause(),
            Some(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn transaction_scope_is_enforced() {
        let db = create_db();
        let err = db
            .run_transaction(&["missing"], TransactionMode::ReadOnly, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Transaction { .. }));

        let err = db
            .run_transaction(&["users"], TransactionMode::ReadWrite, |txn| {
                txn.add("tasks", json!({}))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Transaction { .. }));
        assert_eq!(db.count("tasks").unwrap(), 0);
    }

    #[test]
    fn failed_commit_rolls_back_transaction() {
        let db = Database::new(Schema::enterprise(), InMemoryBackend::with_quota(4096));
        let big = "x".repeat(8192);
        let err = db
            .run_transaction(&["users"], TransactionMode::ReadWrite, |txn| {
                txn.add("users", json!({"bio": big}))
            })
            .unwrap_err();
        assert!(matches!(
            err.transaction_cause(),
            Some(CoreError::QuotaExceeded { .. })
        ));
        assert_eq!(db.count("users").unwrap(), 0);
    }

    #[test]
    fn upgrade_adds_collections_and_backfills_indexes() {
        let backend = Arc::new(InMemoryBackend::new());
        let v1 =
            Schema::new("app", 1).collection("users", CollectionDef::new("id").auto_increment());
        {
            let db = Database::new(v1, Arc::clone(&backend));
            db.add("users", json!({"email": "a@x.test"})).unwrap();
            db.add("users", json!({"email": "b@x.test"})).unwrap();
        }

        let v2 = Schema::new("app", 2)
            .collection(
                "users",
                CollectionDef::new("id")
                    .auto_increment()
                    .index("email", IndexDef::field("email")),
            )
            .collection("tasks", CollectionDef::new("id").auto_increment());
        let db = Database::new(v2.clone(), Arc::clone(&backend));
        assert_eq!(db.version().unwrap(), 2);
        assert_eq!(
            db.query_by_index("users", "email", &json!("b@x.test"))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(db.count("tasks").unwrap(), 0);
        assert_eq!(db.add("users", json!({})).unwrap(), RecordKey::Int(3));
        drop(db);

        // Definitions are persisted: reopening at the same version keeps them.
        let db = Database::new(v2, Arc::clone(&backend));
        assert!(db.query_by_index("users", "email", &json!("a@x.test")).is_ok());
        assert_eq!(backend.image().version, 2);
    }

    #[test]
    fn downgrade_is_rejected() {
        let backend = Arc::new(InMemoryBackend::new());
        Database::new(Schema::new("app", 3), Arc::clone(&backend))
            .open()
            .unwrap();

        let db = Database::new(Schema::new("app", 2), Arc::clone(&backend));
        let err = db.open().unwrap_err();
        assert!(matches!(
            err,
            CoreError::DatabaseUnavailable { message } if message.contains("newer")
        ));
        assert_eq!(db.state(), DatabaseState::Unopened);
    }

    #[test]
    fn backup_restore_round_trip() {
        let db = create_db();
        db.add("users", json!({"name": "Ada", "role": "admin"})).unwrap();
        db.add("users", json!({"name": "Linus", "role": "dev"})).unwrap();
        db.add("settings", json!({"key": "theme", "category": "ui"})).unwrap();

        let snapshot = db.backup().unwrap();
        db.clear("users").unwrap();
        db.add("tasks", json!({"title": "later"})).unwrap();

        let stats = db.restore(&snapshot).unwrap();
        assert_eq!(stats.records_restored, 3);
        assert_eq!(stats.records_cleared, 2);
        assert_eq!(db.count("users").unwrap(), 2);
        assert_eq!(db.count("tasks").unwrap(), 0);
        assert_eq!(
            db.query_by_index("users", "role", &json!("admin")).unwrap()[0]["name"],
            "Ada"
        );
    }

    #[test]
    fn malformed_restore_leaves_data() {
        let db = create_db();
        db.add("users", json!({"name": "Ada"})).unwrap();

        let err = db.restore(r#"{"data": "not-an-object-map"}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidBackupFormat { .. }));
        assert_eq!(db.count("users").unwrap(), 1);
    }

    #[test]
    fn restore_rejects_unknown_collections_and_newer_versions() {
        let db = create_db();
        db.add("users", json!({"name": "Ada"})).unwrap();

        let err = db.restore(r#"{"version": 1, "data": {"ghosts": []}}"#).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));

        let err = db.restore(r#"{"version": 9, "data": {}}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidBackupFormat { .. }));
        assert_eq!(db.count("users").unwrap(), 1);
    }

    #[test]
    fn failed_restore_is_all_or_nothing() {
        let db = create_db();
        db.add("users", json!({"name": "Ada"})).unwrap();

        let err = db
            .restore(r#"{"version": 1, "data": {"users": [{"id": 1}, {"id": 1}]}}"#)
            .unwrap_err();
        assert!(matches!(err, CoreError::Transaction { .. }));
        assert_eq!(db.get_required("users", 1).unwrap()["name"], "Ada");
    }

    #[test]
    fn validate_backup_reports_counts() {
        let db = create_db();
        db.add("users", json!({"name": "Ada"})).unwrap();
        let info = db.validate_backup(&db.backup().unwrap()).unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(info.collections["users"], 1);
        assert_eq!(info.record_count, 1);
    }

    #[test]
    fn stats_measure_serialized_size() {
        let db = create_db();
        db.add("users", json!({"name": "Ada"})).unwrap();
        let stats = db.stats().unwrap();

        let expected = serde_json::to_vec(&json!([{"name": "Ada", "id": 1}]))
            .unwrap()
            .len() as u64;
        assert_eq!(stats.collections["users"].count, 1);
        assert_eq!(stats.collections["users"].size, expected);
        assert_eq!(stats.collections["tasks"].size, 2);
        assert_eq!(stats.collections.len(), 7);
    }

    #[test]
    fn file_backed_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open_path(dir.path(), Schema::enterprise()).unwrap();
            db.add("customers", json!({"name": "Acme", "status": "active"}))
                .unwrap();
            db.add("settings", json!({"key": "tz", "category": "general"}))
                .unwrap();
        }

        let db = Database::open_path(dir.path(), Schema::enterprise()).unwrap();
        assert_eq!(db.count("customers").unwrap(), 1);
        assert_eq!(
            db.query_by_index("customers", "status", &json!("active"))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(db.add("customers", json!({})).unwrap(), RecordKey::Int(2));
    }
}
