//! Cross-instance store locks
//!
//! A lock is a `.<file>.lock` sibling created with `create_new`, so two
//! cache instances (or processes) pointed at the same store never run a
//! read-merge-write cycle on the same document at the same time. The
//! in-process per-key mutex in the cache is taken first; this lock covers
//! everything outside the process. A held lock touches its file every
//! third of `stale_after`, so only an abandoned lock ever looks stale.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use docsync_model::DocKey;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

/// Lock acquisition settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOptions {
    /// Age after which an existing lock file is considered abandoned
    #[serde(with = "duration_millis")]
    pub stale_after: Duration,
    /// Delay between acquisition attempts
    #[serde(with = "duration_millis")]
    pub retry_interval: Duration,
    /// Give up after this long
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            retry_interval: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Metadata written into the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// A held store lock, released on drop
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct StoreLock {
    path: Option<PathBuf>,
    heartbeat: Option<JoinHandle<()>>,
}

impl StoreLock {
    /// Lock that guards nothing, for stores without shared state
    #[inline]
    pub fn noop() -> Self {
        Self {
            path: None,
            heartbeat: None,
        }
    }

    /// Lock file path, if any
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the lock file at `path`, waiting up to `options.timeout`
    ///
    /// # Errors
    /// - `StoreError::LockTimeout` if another holder keeps the lock
    /// - `StoreError::Io` on unexpected filesystem errors
    pub async fn acquire(key: &DocKey, path: PathBuf, options: LockOptions) -> Result<Self, StoreError> {
        let started = Instant::now();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    let json = serde_json::to_vec(&info)
                        .map_err(|e| StoreError::io_error(&path, std::io::Error::other(e)))?;
                    // The guard owns the file from here on; write failures still release it.
                    let mut guard = Self {
                        path: Some(path),
                        heartbeat: None,
                    };
                    if let Err(e) = file.write_all(&json).await {
                        tracing::debug!(key = %key, error = %e, "could not record lock metadata");
                    }
                    let file = file.into_std().await;
                    guard.heartbeat = Some(Self::keep_fresh(key.clone(), file, options.stale_after));
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path, options.stale_after).await {
                        tracing::warn!(key = %key, path = %path.display(), "removing stale store lock");
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    if started.elapsed() >= options.timeout {
                        return Err(StoreError::LockTimeout { key: key.clone() });
                    }
                    tokio::time::sleep(options.retry_interval).await;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if let Some(dir) = path.parent() {
                        tokio::fs::create_dir_all(dir)
                            .await
                            .map_err(|e| StoreError::io_error(dir, e))?;
                    }
                }
                Err(e) => return Err(StoreError::io_error(&path, e)),
            }
        }
    }

    fn keep_fresh(key: DocKey, file: std::fs::File, stale_after: Duration) -> JoinHandle<()> {
        let period = (stale_after / 3).max(Duration::from_millis(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if let Err(e) = file.set_modified(SystemTime::now()) {
                    tracing::debug!(key = %key, error = %e, "could not refresh store lock");
                }
            }
        })
    }

    async fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Serde helpers storing a `Duration` as whole milliseconds
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DocKey {
        DocKey::new("today.md").unwrap()
    }

    #[tokio::test]
    async fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".today.md.lock");
        let options = LockOptions {
            timeout: Duration::from_millis(60),
            ..LockOptions::default()
        };

        let held = StoreLock::acquire(&key(), path.clone(), options).await.unwrap();
        assert!(path.exists());

        let second = StoreLock::acquire(&key(), path.clone(), options).await;
        assert!(matches!(second, Err(StoreError::LockTimeout { .. })));

        drop(held);
        assert!(!path.exists());
        let third = StoreLock::acquire(&key(), path, options).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".today.md.lock");
        std::fs::write(&path, b"{}").unwrap();

        let options = LockOptions {
            stale_after: Duration::ZERO,
            timeout: Duration::from_millis(200),
            ..LockOptions::default()
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let lock = StoreLock::acquire(&key(), path.clone(), options).await.unwrap();
        assert_eq!(lock.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn lock_held_past_stale_after_is_not_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".today.md.lock");
        let options = LockOptions {
            stale_after: Duration::from_millis(300),
            retry_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };

        let held = StoreLock::acquire(&key(), path.clone(), options).await.unwrap();
        // A long flush.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = StoreLock::acquire(&key(), path.clone(), options).await;
        assert!(matches!(second, Err(StoreError::LockTimeout { .. })));
        assert!(path.exists());

        drop(held);
        assert!(!path.exists());
    }

    #[test]
    fn noop_lock_has_no_path() {
        assert!(StoreLock::noop().path().is_none());
    }
}
