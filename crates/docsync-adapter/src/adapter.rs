//! File Adapter - the only path to the Document Store
//!
//! Translates between raw files and parsed bodies:
//! - Load: read → hash → parse (cached by hash)
//! - Persist: render → atomic multi-file write
//!
//! ```text
//! Sync Engine → FileAdapter → DocumentStore → File System
//!                   ↑___________↓
//!                     ParseCache (content-addressed)
//! ```

use crate::error::{AdapterError, StoreError};
use crate::format::{DocumentFormat, TaskListFormat};
use crate::lock::StoreLock;
use crate::parse_cache::{ParseCache, ParseCacheStats};
use crate::store::{DocumentStore, PendingWrite};
use docsync_model::{Body, ContentHash, DocKey};
use std::sync::Arc;
use std::time::SystemTime;

/// A document as it currently exists on disk
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSnapshot {
    /// Parsed content
    pub body: Body,
    /// File modification time
    pub mtime: SystemTime,
    /// Hash of the raw text
    pub hash: ContentHash,
}

/// Result of persisting one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persisted {
    /// New file modification time
    pub mtime: SystemTime,
    /// Hash of the written text
    pub hash: ContentHash,
}

/// Adapter between the document store and parsed bodies
#[derive(Debug, Clone)]
pub struct FileAdapter {
    store: Arc<dyn DocumentStore>,
    format: TaskListFormat,
    parsed: ParseCache,
}

impl FileAdapter {
    /// Create adapter over a store
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_parse_capacity(store, 1_024)
    }

    /// Create adapter with a specific parse cache capacity
    #[inline]
    #[must_use]
    pub fn with_parse_capacity(store: Arc<dyn DocumentStore>, capacity: u64) -> Self {
        Self {
            store,
            format: TaskListFormat::new(),
            parsed: ParseCache::new(capacity),
        }
    }

    /// Read and parse a document
    ///
    /// # Returns
    /// `None` if the key has no backing file
    ///
    /// # Errors
    /// - `AdapterError::Parse` on malformed content
    /// - `AdapterError::Store` on read failures
    pub async fn load(&self, key: &DocKey) -> Result<Option<DiskSnapshot>, AdapterError> {
        let Some(raw) = self.store.read(key).await? else {
            return Ok(None);
        };
        let hash = ContentHash::of_text(&raw.text);
        let format = self.format;
        let body = self
            .parsed
            .try_get_or_parse(hash, || format.parse(&raw.text))
            .await
            .map_err(|source| AdapterError::Parse {
                key: key.clone(),
                source,
            })?;
        tracing::debug!(key = %key, hash = %hash.short(), lines = body.entries.len(), "loaded document");
        Ok(Some(DiskSnapshot {
            body: Body::clone(&body),
            mtime: raw.mtime,
            hash,
        }))
    }

    /// Current modification time of a document's file
    ///
    /// # Errors
    /// Returns error if the file cannot be inspected.
    pub async fn probe(&self, key: &DocKey) -> Result<Option<SystemTime>, StoreError> {
        self.store.stat(key).await
    }

    /// Render a body to file text
    #[inline]
    #[must_use]
    pub fn render(&self, body: &Body) -> String {
        self.format.render(body)
    }

    /// Take the cross-instance lock for a key
    ///
    /// # Errors
    /// Returns error if the lock cannot be acquired in time.
    pub async fn lock(&self, key: &DocKey) -> Result<StoreLock, StoreError> {
        self.store.lock(key).await
    }

    /// Render and atomically write documents, in order
    ///
    /// # Errors
    /// Returns error if any file cannot be written; no file is left partial.
    pub async fn persist(&self, docs: &[(DocKey, &Body)]) -> Result<Vec<Persisted>, StoreError> {
        let mut writes = Vec::with_capacity(docs.len());
        let mut hashes = Vec::with_capacity(docs.len());
        for (key, body) in docs {
            let text = self.render(body);
            let hash = ContentHash::of_text(&text);
            // Seed the parse cache so the next load of these bytes skips parsing.
            self.parsed.insert(hash, Arc::new(Body::clone(body))).await;
            hashes.push(hash);
            writes.push(PendingWrite {
                key: key.clone(),
                text,
            });
        }
        let mtimes = self.store.write(writes).await?;
        Ok(mtimes
            .into_iter()
            .zip(hashes)
            .map(|(mtime, hash)| Persisted { mtime, hash })
            .collect())
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Parse cache statistics
    #[inline]
    #[must_use]
    pub fn parse_stats(&self) -> ParseCacheStats {
        self.parsed.stats()
    }
}
