//! Testing utilities for docsync workspace
//!
//! Shared fixtures: temporary stores, stores with injected failures or
//! gated writes, and sample task documents.

#![allow(missing_docs)]

use async_trait::async_trait;
use docsync_adapter::{DocumentStore, FileStore, PendingWrite, RawFile, StoreError, StoreLock};
use docsync_model::DocKey;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

/// The two-line document used by the archival scenarios
pub const SAMPLE_TODAY: &str = "- [ ] buy milk\n- [x] call client (2025-01-01)\n";

/// A document mixing tasks with passthrough content
pub const SAMPLE_MIXED: &str = "# Today\n\n- [ ] buy milk\n<!-- notes -->\n  - [x] call client (2025-01-01)\n- plain bullet\n";

pub fn key(raw: &str) -> DocKey {
    DocKey::new(raw).unwrap()
}

/// Store rooted in a temporary directory, removed on drop
#[derive(Debug)]
pub struct TempStore {
    dir: TempDir,
}

impl TempStore {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Temp store pre-populated with one file
    pub fn with_file(key: &str, text: &str) -> Self {
        let store = Self::new();
        store.write(key, text);
        store
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.path().join(key)
    }

    /// Write a file behind the cache's back
    ///
    /// The new mtime always differs from the previous one, even on
    /// filesystems with coarse timestamps.
    pub fn write(&self, key: &str, text: &str) {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let before = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        std::fs::write(&path, text).unwrap();
        if let Some(before) = before {
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            let after = file.metadata().unwrap().modified().unwrap();
            if after <= before {
                file.set_modified(before + Duration::from_millis(10)).unwrap();
            }
        }
    }

    pub fn read(&self, key: &str) -> String {
        std::fs::read_to_string(self.path(key)).unwrap()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path(key).exists()
    }

    /// A fresh `FileStore` over this directory
    pub fn file_store(&self) -> Arc<dyn DocumentStore> {
        Arc::new(FileStore::new(self.root()))
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `FileStore` wrapper whose writes can be made to fail
#[derive(Debug)]
pub struct FailingStore {
    inner: FileStore,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: FileStore::new(root),
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Write calls seen, including failed ones
    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn read(&self, key: &DocKey) -> Result<Option<RawFile>, StoreError> {
        self.inner.read(key).await
    }

    async fn stat(&self, key: &DocKey) -> Result<Option<SystemTime>, StoreError> {
        self.inner.stat(key).await
    }

    async fn write(&self, writes: Vec<PendingWrite>) -> Result<Vec<SystemTime>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            let path = writes
                .first()
                .map(|w| self.inner.path_for(&w.key))
                .unwrap_or_default();
            return Err(StoreError::io_error(
                path,
                std::io::Error::other("injected write failure"),
            ));
        }
        self.inner.write(writes).await
    }

    async fn lock(&self, key: &DocKey) -> Result<StoreLock, StoreError> {
        self.inner.lock(key).await
    }
}

/// `FileStore` wrapper whose writes wait for an explicit release
#[derive(Debug)]
pub struct GatedStore {
    inner: FileStore,
    entered: Notify,
    release: Semaphore,
}

impl GatedStore {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: FileStore::new(root),
            entered: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    /// Wait until a write has reached the store
    pub async fn write_started(&self) {
        self.entered.notified().await;
    }

    /// Let one pending write proceed
    pub fn release_one(&self) {
        self.release.add_permits(1);
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn read(&self, key: &DocKey) -> Result<Option<RawFile>, StoreError> {
        self.inner.read(key).await
    }

    async fn stat(&self, key: &DocKey) -> Result<Option<SystemTime>, StoreError> {
        self.inner.stat(key).await
    }

    async fn write(&self, writes: Vec<PendingWrite>) -> Result<Vec<SystemTime>, StoreError> {
        self.entered.notify_one();
        let permit = self.release.acquire().await.unwrap();
        permit.forget();
        self.inner.write(writes).await
    }

    async fn lock(&self, key: &DocKey) -> Result<StoreLock, StoreError> {
        self.inner.lock(key).await
    }
}
