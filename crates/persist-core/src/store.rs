//! Key-value store
//!
//! The `Store` keeps every key in its own JSON file and serves reads from
//! an in-memory cache. Writes update the cache at call time and are
//! persisted by a deferred flush that coalesces bursts into one disk pass.
//!
//! ## Consistency
//!
//! - A read after a write to the same key sees the written value, whether
//!   or not the flush has happened yet.
//! - A delete leaves a tombstone in the cache, so reads issued before the
//!   file is removed never fall back to the stale file.
//! - Failed disk reads are not cached; the next read tries disk again.
//!
//! Two stores pointed at the same directory at once are not supported.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open("/var/lib/app/persist", true)?;
//!
//! store.set("prefs", json!({"theme": "dark"})).await?;
//! store.set_path("prefs", "window.width", json!(800)).await?;
//!
//! let width = store.get_path("prefs", "window.width", json!(640)).await;
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::flush::{self, FlushCoordinator, InFlight};
use crate::path;
use crate::storage::disk::RecordDir;
use crate::storage::queue::{Lookup, PendingOp, StoreState, Ticket};
use crate::storage::{StorageStats, StoreError, StoreResult};

/// Shared state behind every `Store` handle
#[derive(Debug)]
pub(crate) struct StoreInner {
    pub(crate) dir: RecordDir,
    state: Mutex<StoreState>,
    pub(crate) flusher: FlushCoordinator,
}

impl StoreInner {
    pub(crate) fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Embedded JSON file key-value store
///
/// Cloning is cheap; all clones share the same cache and write queue.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// A `set_path` either applied to the cached value or waiting on a disk read
enum PathWrite {
    Staged(StoreResult<Ticket>),
    AfterRead { key: String, path: String, value: Value },
}

impl Store {
    /// Open a store in `directory`
    pub fn open(directory: impl Into<PathBuf>, preload: bool) -> StoreResult<Self> {
        Self::init(&Config::new(directory).with_preload(preload))
    }

    /// Initialize a store from configuration
    ///
    /// Creates the directory (recursively, pre-existing is fine) and, with
    /// `preload`, reads every managed record into the cache. Each call
    /// starts from an empty cache and write queue.
    pub fn init(config: &Config) -> StoreResult<Self> {
        if config.directory.as_os_str().is_empty() {
            return Err(StoreError::Configuration(
                "a store directory must be specified".to_string(),
            ));
        }

        let dir = RecordDir::create(config.directory.clone(), config.pretty)?;
        let store = Self {
            inner: Arc::new(StoreInner {
                dir,
                state: Mutex::new(StoreState::default()),
                flusher: FlushCoordinator::new(),
            }),
        };

        if config.preload {
            store.preload()?;
        }

        info!(
            "Store initialized at {:?} (preload={}, cached={})",
            store.directory(),
            config.preload,
            store.inner.state().cached_keys()
        );
        Ok(store)
    }

    fn preload(&self) -> StoreResult<()> {
        debug!("preloading {:?}", self.directory());
        for key in self.inner.dir.scan_keys()? {
            let generation = self.inner.state().generation(&key);
            match self.inner.dir.read_sync(&key) {
                Ok(value) => {
                    self.inner.state().fill(&key, generation, value);
                }
                Err(e) => warn!("Skipping unreadable record for key {:?}: {}", key, e),
            }
        }
        Ok(())
    }

    /// Directory holding the record files
    pub fn directory(&self) -> &Path {
        self.inner.dir.root()
    }

    /// Disk activity since the store was opened
    pub fn stats(&self) -> StorageStats {
        self.inner.dir.counters().snapshot()
    }

    /// Number of keys with an operation not yet on disk
    pub fn pending_writes(&self) -> usize {
        self.inner.state().queue_len()
    }

    // ==================== Reads ====================

    /// Get the value for `key`, blocking on disk if it is not cached
    ///
    /// Missing and unreadable records both read as `None`.
    pub fn get_sync(&self, key: &str) -> Option<Value> {
        let (lookup, generation) = {
            let state = self.inner.state();
            (state.lookup(key), state.generation(key))
        };
        match lookup {
            Lookup::Hit(value) => {
                debug!("cache read sync {:?}", key);
                return Some(value);
            }
            Lookup::Deleted => return None,
            Lookup::Miss => {}
        }

        match self.inner.dir.read_sync(key) {
            Ok(value) => self.inner.state().fill(key, generation, value),
            Err(e) => {
                debug!("read of {:?} failed, treating as absent: {}", key, e);
                None
            }
        }
    }

    /// Get the value for `key`
    ///
    /// Missing and unreadable records both read as `None`.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let (lookup, generation) = {
            let state = self.inner.state();
            (state.lookup(key), state.generation(key))
        };
        match lookup {
            Lookup::Hit(value) => {
                debug!("cache read {:?}", key);
                return Some(value);
            }
            Lookup::Deleted => return None,
            Lookup::Miss => {}
        }

        match self.inner.dir.read(key).await {
            Ok(value) => self.inner.state().fill(key, generation, value),
            Err(e) => {
                debug!("read of {:?} failed, treating as absent: {}", key, e);
                None
            }
        }
    }

    /// Read the value at `path` inside the record for `key`
    pub fn get_path_sync(&self, key: &str, path: &str, default: Value) -> Value {
        path::get_path(self.get_sync(key).as_ref(), path, default)
    }

    /// Read the value at `path` inside the record for `key`
    pub async fn get_path(&self, key: &str, path: &str, default: Value) -> Value {
        path::get_path(self.get(key).await.as_ref(), path, default)
    }

    // ==================== Writes ====================

    /// Set `key` and write it to disk before returning
    pub fn set_sync(&self, key: impl Into<String>, value: Value) -> StoreResult<()> {
        self.stage(key.into(), PendingOp::Write(value))?;
        self.flush_sync()
    }

    /// Set `key`
    ///
    /// The cache is updated when this is called, so reads see the value
    /// right away. The returned future resolves once the flush carrying
    /// the write has finished; it does not have to be awaited for the
    /// write to reach disk when called inside a tokio runtime.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> impl Future<Output = StoreResult<()>> + Send + 'static {
        let staged = self.stage_and_schedule(key.into(), PendingOp::Write(value));
        let store = self.clone();
        async move { store.settle(staged?).await }
    }

    /// Delete `key` and remove its file before returning
    pub fn delete_sync(&self, key: impl Into<String>) -> StoreResult<()> {
        self.stage(key.into(), PendingOp::Delete)?;
        self.flush_sync()
    }

    /// Delete `key`
    ///
    /// Reads see the key as absent immediately. Like [`Store::set`], the
    /// future resolves once the file removal has been flushed.
    pub fn delete(
        &self,
        key: impl Into<String>,
    ) -> impl Future<Output = StoreResult<()>> + Send + 'static {
        let staged = self.stage_and_schedule(key.into(), PendingOp::Delete);
        let store = self.clone();
        async move { store.settle(staged?).await }
    }

    /// Write `value` at `path` inside the record for `key`
    ///
    /// Reads the whole record (an empty object if absent), modifies it,
    /// and writes it back with [`Store::set_sync`].
    pub fn set_path_sync(&self, key: impl Into<String>, path: &str, value: Value) -> StoreResult<()> {
        let key = key.into();
        let current = self.get_sync(&key);
        self.stage_path(key, current, path, value)?;
        self.flush_sync()
    }

    /// Write `value` at `path` inside the record for `key`
    ///
    /// A cached record is modified when this is called; otherwise the
    /// record is read from disk first. Either way the whole record is
    /// written back, so unsequenced `set_path` calls on one key can
    /// overwrite each other.
    pub fn set_path(
        &self,
        key: impl Into<String>,
        path: &str,
        value: Value,
    ) -> impl Future<Output = StoreResult<()>> + Send + 'static {
        let key = key.into();
        let lookup = self.inner.state().lookup(&key);
        let write = match lookup {
            Lookup::Hit(current) => PathWrite::Staged(self.stage_path(key, Some(current), path, value)),
            Lookup::Deleted => PathWrite::Staged(self.stage_path(key, None, path, value)),
            Lookup::Miss => PathWrite::AfterRead {
                key,
                path: path.to_string(),
                value,
            },
        };
        if matches!(write, PathWrite::Staged(Ok(_))) {
            flush::schedule(&self.inner);
        }

        let store = self.clone();
        async move {
            let ticket = match write {
                PathWrite::Staged(staged) => staged?,
                PathWrite::AfterRead { key, path, value } => {
                    let current = store.get(&key).await;
                    let ticket = store.stage_path(key, current, &path, value)?;
                    flush::schedule(&store.inner);
                    ticket
                }
            };
            store.settle(ticket).await
        }
    }

    // ==================== Flushing ====================

    /// Flush queued writes to disk
    ///
    /// If a flush is already running this returns immediately; writes
    /// queued before that flush reads the queue are part of its pass.
    pub async fn flush(&self) -> StoreResult<()> {
        match InFlight::begin(&self.inner) {
            Some(guard) => flush::run(guard).await,
            None => {
                debug!("flush already in flight, coalescing");
                Ok(())
            }
        }
    }

    /// Write every queued operation to disk on the calling thread
    pub fn flush_sync(&self) -> StoreResult<()> {
        flush::drain_sync(&self.inner)
    }

    /// Whether an async flush is currently running
    pub fn is_flushing(&self) -> bool {
        self.inner.flusher.is_in_flight()
    }

    // ==================== Internals ====================

    fn stage(&self, key: String, op: PendingOp) -> StoreResult<Ticket> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        Ok(self.inner.state().stage(key, op))
    }

    fn stage_and_schedule(&self, key: String, op: PendingOp) -> StoreResult<Ticket> {
        let ticket = self.stage(key, op)?;
        flush::schedule(&self.inner);
        Ok(ticket)
    }

    fn stage_path(
        &self,
        key: String,
        current: Option<Value>,
        path: &str,
        value: Value,
    ) -> StoreResult<Ticket> {
        let mut object = current.unwrap_or_else(|| Value::Object(Map::new()));
        path::set_path(&mut object, path, value)?;
        self.stage(key, PendingOp::Write(object))
    }

    /// Wait until the staged operation has been flushed
    ///
    /// Drives the flush itself when none is running. If a running flush
    /// fails, the operation is still queued and the retry here reports
    /// the error.
    async fn settle(&self, ticket: Ticket) -> StoreResult<()> {
        loop {
            let pending = self.inner.state().is_pending(&ticket);
            if !pending {
                return Ok(());
            }
            match InFlight::begin(&self.inner) {
                Some(guard) => flush::run(guard).await?,
                None => self.inner.flusher.wait_idle().await,
            }
        }
    }
}
