//! Document Cache - the single consistency point for documents
//!
//! # Concurrency
//! - Each key owns a slot: an immutable `Arc<Document>` snapshot behind a
//!   short read/write lock, plus an async write section
//! - `apply`, `flush` and stale reloads of one key run inside its write
//!   section, so they are serialized and linearizable per key
//! - `get` only swaps the snapshot `Arc`, so readers see either the full
//!   pre- or the full post-mutation document
//! - Distinct keys never share a section and proceed in parallel
//!
//! All disk I/O goes through the [`SyncEngine`].

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::flush::{FlushHandle, FlushState};
use crate::sync::SyncEngine;
use dashmap::DashMap;
use docsync_adapter::{DocumentStore, FileAdapter, FileStore};
use docsync_model::{DocKey, Document, Mutation};
use futures::future::join_all;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-key cache slot
#[derive(Debug)]
struct Slot {
    current: RwLock<Arc<Document>>,
    write: Arc<Mutex<()>>,
}

impl Slot {
    fn new(doc: Document) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(doc)),
            write: Arc::new(Mutex::new(())),
        })
    }

    fn snapshot(&self) -> Arc<Document> {
        Arc::clone(&self.current.read())
    }

    fn replace(&self, doc: Document) -> Arc<Document> {
        let doc = Arc::new(doc);
        *self.current.write() = Arc::clone(&doc);
        doc
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Documents held
    pub documents: usize,
    /// Documents with unflushed changes
    pub dirty: usize,
    /// `get` calls served without touching file content
    pub hits: u64,
    /// Cold loads from disk
    pub loads: u64,
    /// Reloads after an external change
    pub reloads: u64,
    /// Successful flushes
    pub flushes: u64,
    /// Failed flushes
    pub flush_failures: u64,
    /// Rejected stale `apply` calls
    pub conflicts: u64,
    /// Parsed bodies in the parse cache
    pub parsed_bodies: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    loads: AtomicU64,
    reloads: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    conflicts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of [`DocumentCache::flush_all`]
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Keys persisted
    pub flushed: Vec<DocKey>,
    /// Keys that stayed dirty, with the reason
    pub failed: Vec<(DocKey, CacheError)>,
}

impl FlushReport {
    /// Whether every dirty document was persisted
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
struct Shared {
    slots: DashMap<DocKey, Arc<Slot>>,
    engine: SyncEngine,
    config: CacheConfig,
    counters: Counters,
}

/// In-memory documents backed by a [`DocumentStore`]
///
/// Cloning is cheap and shares the same cache; construct one per store and
/// pass it to every consumer.
#[derive(Debug, Clone)]
pub struct DocumentCache {
    shared: Arc<Shared>,
}

impl DocumentCache {
    /// Create a cache over `store`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: CacheConfig) -> Self {
        let adapter = FileAdapter::with_parse_capacity(store, config.parse_cache_capacity);
        Self {
            shared: Arc::new(Shared {
                slots: DashMap::new(),
                engine: SyncEngine::new(adapter),
                config,
                counters: Counters::default(),
            }),
        }
    }

    /// Create a cache over a directory, using the configured lock settings
    #[must_use]
    pub fn open(root: impl Into<PathBuf>, config: CacheConfig) -> Self {
        let store = FileStore::with_lock_options(root, config.lock_options());
        Self::new(Arc::new(store), config)
    }

    /// Cache configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Key of the archive document paired with `key`
    #[inline]
    #[must_use]
    pub fn archive_key(&self, key: &DocKey) -> DocKey {
        key.archive_sibling(&self.shared.config.archive_suffix)
    }

    /// Current document for `key`
    ///
    /// Loads it on first access and reloads it when the backing file
    /// changed since it was last observed.
    ///
    /// # Errors
    /// - `CacheError::NotFound` if there is no file and no in-memory document
    /// - `CacheError::Parse` if the file is malformed
    /// - `CacheError::Store` on read failures
    pub async fn get(&self, key: &DocKey) -> Result<Arc<Document>, CacheError> {
        let Some(slot) = self.shared.slot(key) else {
            return Ok(self.shared.load(key).await?.snapshot());
        };
        let current = slot.snapshot();
        if self.shared.engine.is_stale(&current).await? {
            return self.shared.refresh(key, &slot).await;
        }
        Counters::bump(&self.shared.counters.hits);
        Ok(current)
    }

    /// Current document, or a new empty one if `key` has no backing file
    ///
    /// A created document is dirty; its first flush creates the file.
    ///
    /// # Errors
    /// Same as [`DocumentCache::get`], except `NotFound`.
    pub async fn get_or_create(&self, key: &DocKey) -> Result<Arc<Document>, CacheError> {
        match self.get(key).await {
            Err(CacheError::NotFound { .. }) => {
                let slot = self.shared.insert(key, || {
                    info!(key = %key, "created document");
                    Document::created(key.clone())
                });
                Ok(slot.snapshot())
            }
            other => other,
        }
    }

    /// Apply `mutation` if the document is still at `expected_version`
    ///
    /// Never touches disk beyond a cold load.
    ///
    /// # Returns
    /// The new version
    ///
    /// # Errors
    /// - `CacheError::Conflict` if the version moved; state is unchanged
    /// - `CacheError::Rejected` if the mutation is invalid; state is unchanged
    /// - `CacheError::NotFound` if the document does not exist
    pub async fn apply(
        &self,
        key: &DocKey,
        mutation: Mutation,
        expected_version: u64,
    ) -> Result<u64, CacheError> {
        let slot = match self.shared.slot(key) {
            Some(slot) => slot,
            None => self.shared.load(key).await?,
        };
        let _section = slot.write.lock().await;

        let current = slot.snapshot();
        if current.version() != expected_version {
            Counters::bump(&self.shared.counters.conflicts);
            warn!(
                key = %key,
                expected = expected_version,
                actual = current.version(),
                op = mutation.name(),
                "rejected stale mutation"
            );
            return Err(CacheError::conflict(key, expected_version, current.version()));
        }

        let next = current
            .commit(&mutation)
            .map_err(|source| CacheError::Rejected {
                key: key.clone(),
                source,
            })?;
        let version = next.version();
        slot.replace(next);
        debug!(key = %key, op = mutation.name(), version, "applied mutation");
        Ok(version)
    }

    /// Persist pending changes for `key`
    ///
    /// Does nothing for a clean document. On failure the document stays
    /// dirty; the cache does not retry on its own.
    ///
    /// # Errors
    /// - `CacheError::FlushFailed` if the write fails
    /// - `CacheError::NotFound` if `key` is not cached
    pub async fn flush(&self, key: &DocKey) -> Result<(), CacheError> {
        self.flush_in_background(key).wait().await
    }

    /// Persist `primary` and `secondary` as one logical write
    ///
    /// Both files are staged before either is replaced; `secondary` (the
    /// archive) is renamed first. A crash between the two renames leaves
    /// archived entries whose primary lines still read completed; the next
    /// archival pass reconciles them without duplicates.
    ///
    /// # Errors
    /// Same as [`DocumentCache::flush`]; neither document is marked clean
    /// unless both were written.
    pub async fn flush_linked(&self, primary: &DocKey, secondary: &DocKey) -> Result<(), CacheError> {
        let keys = if primary == secondary {
            vec![primary.clone()]
        } else {
            vec![secondary.clone(), primary.clone()]
        };
        self.spawn_flush(primary, keys).wait().await
    }

    /// Start a flush of `key` in the background
    ///
    /// Must be called within a Tokio runtime.
    pub fn flush_in_background(&self, key: &DocKey) -> FlushHandle {
        self.spawn_flush(key, vec![key.clone()])
    }

    /// Flush every dirty document
    ///
    /// Failures are collected rather than stopping the pass.
    pub async fn flush_all(&self) -> FlushReport {
        let handles: Vec<FlushHandle> = self
            .dirty_keys()
            .iter()
            .map(|key| self.flush_in_background(key))
            .collect();
        let keys: Vec<DocKey> = handles.iter().map(|h| h.key().clone()).collect();
        let results = join_all(handles.into_iter().map(FlushHandle::wait)).await;

        let mut report = FlushReport::default();
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(()) => report.flushed.push(key),
                Err(e) => report.failed.push((key, e)),
            }
        }
        info!(
            flushed = report.flushed.len(),
            failed = report.failed.len(),
            "flushed all dirty documents"
        );
        report
    }

    /// Cached keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<DocKey> {
        let mut keys: Vec<DocKey> = self.shared.slots.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Keys with unflushed changes, sorted
    #[must_use]
    pub fn dirty_keys(&self) -> Vec<DocKey> {
        let mut keys: Vec<DocKey> = self
            .shared
            .slots
            .iter()
            .filter(|e| e.value().snapshot().is_dirty())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Whether `key` is held in memory
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &DocKey) -> bool {
        self.shared.slots.contains_key(key)
    }

    /// Cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let counters = &self.shared.counters;
        CacheStats {
            documents: self.shared.slots.len(),
            dirty: self.dirty_keys().len(),
            hits: counters.hits.load(Ordering::Relaxed),
            loads: counters.loads.load(Ordering::Relaxed),
            reloads: counters.reloads.load(Ordering::Relaxed),
            flushes: counters.flushes.load(Ordering::Relaxed),
            flush_failures: counters.flush_failures.load(Ordering::Relaxed),
            conflicts: counters.conflicts.load(Ordering::Relaxed),
            parsed_bodies: self.shared.engine.adapter().parse_stats().entry_count,
        }
    }

    /// Spawn a flush of `keys`, renamed in the given order
    fn spawn_flush(&self, subject: &DocKey, keys: Vec<DocKey>) -> FlushHandle {
        let state = Arc::new(FlushState::default());
        let shared = Arc::clone(&self.shared);
        let task_state = Arc::clone(&state);
        let task_subject = subject.clone();
        let task = tokio::spawn(async move { shared.run_flush(&task_subject, &keys, &task_state).await });
        FlushHandle::new(subject.clone(), state, task)
    }
}

impl Shared {
    fn slot(&self, key: &DocKey) -> Option<Arc<Slot>> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Insert unless another task got there first
    fn insert(&self, key: &DocKey, doc: impl FnOnce() -> Document) -> Arc<Slot> {
        Arc::clone(&self.slots.entry(key.clone()).or_insert_with(|| Slot::new(doc())))
    }

    async fn load(&self, key: &DocKey) -> Result<Arc<Slot>, CacheError> {
        let Some(doc) = self.engine.pull(key, None).await? else {
            return Err(CacheError::NotFound { key: key.clone() });
        };
        Counters::bump(&self.counters.loads);
        info!(key = %key, lines = doc.entries().len(), "loaded document");
        Ok(self.insert(key, || doc))
    }

    async fn refresh(&self, key: &DocKey, slot: &Slot) -> Result<Arc<Document>, CacheError> {
        let _section = slot.write.lock().await;
        let current = slot.snapshot();
        // A flush may have synced the document while we waited.
        if !self.engine.is_stale(&current).await? {
            return Ok(current);
        }
        match self.engine.pull(key, Some(&current)).await? {
            Some(doc) => {
                Counters::bump(&self.counters.reloads);
                info!(
                    key = %key,
                    version = doc.version(),
                    dirty = doc.is_dirty(),
                    "reloaded externally changed document"
                );
                Ok(slot.replace(doc))
            }
            None => Ok(current),
        }
    }

    async fn run_flush(
        &self,
        subject: &DocKey,
        keys: &[DocKey],
        state: &FlushState,
    ) -> Result<(), CacheError> {
        let mut slots = Vec::with_capacity(keys.len());
        for key in keys {
            let slot = self
                .slot(key)
                .ok_or_else(|| CacheError::NotFound { key: key.clone() })?;
            slots.push(slot);
        }

        let mut lock_order: Vec<usize> = (0..keys.len()).collect();
        lock_order.sort_by(|a, b| keys[*a].cmp(&keys[*b]));
        let mut sections = Vec::with_capacity(lock_order.len());
        for idx in lock_order {
            sections.push(Arc::clone(&slots[idx].write).lock_owned().await);
        }

        if !state.begin_write() {
            return Err(CacheError::Cancelled {
                key: subject.clone(),
            });
        }

        let (targets, docs): (Vec<&Arc<Slot>>, Vec<Arc<Document>>) = slots
            .iter()
            .map(|slot| (slot, slot.snapshot()))
            .filter(|(_, doc)| doc.is_dirty())
            .unzip();
        if docs.is_empty() {
            debug!(key = %subject, "nothing to flush");
            return Ok(());
        }

        match self.engine.push(&docs).await {
            Ok(written) => {
                for (slot, doc) in targets.into_iter().zip(written) {
                    info!(key = %doc.key(), version = doc.version(), "flushed document");
                    slot.replace(doc);
                }
                Counters::bump(&self.counters.flushes);
                Ok(())
            }
            Err(e) => {
                Counters::bump(&self.counters.flush_failures);
                warn!(key = %subject, error = %e, "flush failed, document stays dirty");
                Err(e)
            }
        }
    }
}
