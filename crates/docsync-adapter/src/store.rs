//! Document Store access
//!
//! [`DocumentStore`] is the seam between the sync engine and the file
//! system. [`FileStore`] is the on-disk implementation: one file per key
//! under a root directory, atomic temp-then-rename writes, and lock files
//! for cross-instance exclusion.

use crate::error::StoreError;
use crate::lock::{LockOptions, StoreLock};
use async_trait::async_trait;
use docsync_model::DocKey;
use std::fmt::Debug;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Raw file content with its modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// File text
    pub text: String,
    /// Modification time when read
    pub mtime: SystemTime,
}

/// One file of a (possibly multi-file) atomic write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Target document
    pub key: DocKey,
    /// Full new content
    pub text: String,
}

/// Access to the authoritative document files
///
/// # Contract
/// - `write` leaves every target with either its old or its new complete
///   content, never a partial file
/// - Multi-file writes stage every file before the first rename and rename
///   in the order given
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug + 'static {
    /// Read a document's raw text, `None` if it has no backing file
    async fn read(&self, key: &DocKey) -> Result<Option<RawFile>, StoreError>;

    /// Modification time, `None` if it has no backing file
    async fn stat(&self, key: &DocKey) -> Result<Option<SystemTime>, StoreError>;

    /// Atomically replace one or more files, returning their new mtimes
    async fn write(&self, writes: Vec<PendingWrite>) -> Result<Vec<SystemTime>, StoreError>;

    /// Take the cross-instance lock for a key
    async fn lock(&self, key: &DocKey) -> Result<StoreLock, StoreError>;
}

/// Directory-backed document store
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    lock_options: LockOptions,
}

impl FileStore {
    /// Store rooted at `root` with default lock settings
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_lock_options(root, LockOptions::default())
    }

    /// Store with explicit lock settings
    #[inline]
    #[must_use]
    pub fn with_lock_options(root: impl Into<PathBuf>, lock_options: LockOptions) -> Self {
        Self {
            root: root.into(),
            lock_options,
        }
    }

    /// Store root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path backing a key
    #[must_use]
    pub fn path_for(&self, key: &DocKey) -> PathBuf {
        key.segments().fold(self.root.clone(), |path, seg| path.join(seg))
    }

    /// Lock file path for a key
    #[must_use]
    pub fn lock_path_for(&self, key: &DocKey) -> PathBuf {
        let path = self.path_for(key);
        let name = format!(".{}.lock", key.file_name());
        path.with_file_name(name)
    }

    /// Stage temp files next to their targets, then rename in order
    fn write_blocking(targets: Vec<(PathBuf, String)>) -> Result<Vec<SystemTime>, StoreError> {
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(targets.len());
        for (path, text) in targets {
            match Self::stage(&path, &text) {
                Ok(tmp) => staged.push((tmp, path)),
                Err(e) => {
                    Self::discard(&staged);
                    return Err(e);
                }
            }
        }

        let mut mtimes = Vec::with_capacity(staged.len());
        for (idx, (tmp, path)) in staged.iter().enumerate() {
            let landed = std::fs::rename(tmp, path)
                .and_then(|()| std::fs::metadata(path))
                .and_then(|meta| meta.modified());
            match landed {
                Ok(mtime) => mtimes.push(mtime),
                Err(e) => {
                    // Temp files from `idx` on are unrenamed, or already gone.
                    Self::discard(&staged[idx..]);
                    return Err(StoreError::io_error(path, e));
                }
            }
        }

        if let Some((_, first)) = staged.first() {
            if let Some(dir) = first.parent() {
                if let Ok(d) = std::fs::File::open(dir) {
                    let _ = d.sync_all();
                }
            }
        }
        Ok(mtimes)
    }

    fn stage(path: &Path, text: &str) -> Result<PathBuf, StoreError> {
        let dir = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io_error(dir, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));
        let result = std::fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(text.as_bytes())?;
            file.sync_all()
        });
        match result {
            Ok(()) => Ok(tmp),
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                Err(StoreError::io_error(path, e))
            }
        }
    }

    fn discard(staged: &[(PathBuf, PathBuf)]) {
        for (tmp, _) in staged {
            let _ = std::fs::remove_file(tmp);
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn read(&self, key: &DocKey) -> Result<Option<RawFile>, StoreError> {
        let path = self.path_for(key);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io_error(&path, e)),
        };
        let mtime = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| StoreError::io_error(&path, e))?;
        Ok(Some(RawFile { text, mtime }))
    }

    async fn stat(&self, key: &DocKey) -> Result<Option<SystemTime>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => meta
                .modified()
                .map(Some)
                .map_err(|e| StoreError::io_error(&path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io_error(&path, e)),
        }
    }

    async fn write(&self, writes: Vec<PendingWrite>) -> Result<Vec<SystemTime>, StoreError> {
        let targets: Vec<_> = writes
            .into_iter()
            .map(|w| (self.path_for(&w.key), w.text))
            .collect();
        // Runs to completion even if the awaiting future is dropped.
        tokio::task::spawn_blocking(move || Self::write_blocking(targets))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    async fn lock(&self, key: &DocKey) -> Result<StoreLock, StoreError> {
        StoreLock::acquire(key, self.lock_path_for(key), self.lock_options).await
    }
}
