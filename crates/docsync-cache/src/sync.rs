//! Sync Engine - reconciles cached documents with the Document Store
//!
//! # Pull (disk → cache)
//! - Absent key: parse the file, version 0, clean
//! - Clean cached copy: replace it, keeping the version when the content
//!   is unchanged and moving past it otherwise
//! - Dirty cached copy: merge disk content in, stay dirty
//!
//! # Push (cache → disk)
//! 1. Store locks for every target, in key order
//! 2. Re-read each target; an mtime or hash change means an external edit
//! 3. Merge external edits against the last observed disk body
//!    (see [`crate::merge`])
//! 4. Render and write all targets atomically (temp + rename, in order)
//!
//! The caller holds the per-key write sections for the whole push.

use crate::error::CacheError;
use crate::merge::merge;
use docsync_adapter::FileAdapter;
use docsync_model::{Body, DocKey, Document};
use std::sync::Arc;
use tracing::{debug, info};

/// Moves documents between the cache and the store
#[derive(Debug, Clone)]
pub struct SyncEngine {
    adapter: FileAdapter,
}

impl SyncEngine {
    /// Create engine over an adapter
    #[inline]
    #[must_use]
    pub fn new(adapter: FileAdapter) -> Self {
        Self { adapter }
    }

    /// Underlying file adapter
    #[inline]
    #[must_use]
    pub fn adapter(&self) -> &FileAdapter {
        &self.adapter
    }

    /// Whether the backing file changed since `doc` last observed it
    ///
    /// A missing file is never stale: there is nothing to pull.
    ///
    /// # Errors
    /// Returns `CacheError::Store` if the file cannot be inspected.
    pub async fn is_stale(&self, doc: &Document) -> Result<bool, CacheError> {
        let key = doc.key();
        let on_disk = self
            .adapter
            .probe(key)
            .await
            .map_err(|source| CacheError::Store {
                key: key.clone(),
                source,
            })?;
        Ok(match (doc.source_mtime(), on_disk) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(seen), Some(now)) => seen != now,
        })
    }

    /// Load `key` from disk, reconciling with the previously cached copy
    ///
    /// # Returns
    /// `None` if the key has no backing file
    ///
    /// # Errors
    /// - `CacheError::Parse` if the file is malformed
    /// - `CacheError::Store` on read failures
    pub async fn pull(
        &self,
        key: &DocKey,
        previous: Option<&Document>,
    ) -> Result<Option<Document>, CacheError> {
        let Some(disk) = self
            .adapter
            .load(key)
            .await
            .map_err(|e| CacheError::from_adapter(key, e))?
        else {
            return Ok(None);
        };

        let doc = match previous {
            None => Document::loaded(key.clone(), disk.body, disk.mtime, disk.hash),
            Some(prev) if prev.is_dirty() => {
                let outcome = merge(prev.base(), prev.body(), &disk.body);
                debug!(
                    key = %key,
                    added = outcome.added,
                    promoted = outcome.promoted,
                    "merged external change into dirty document"
                );
                prev.reconciled(outcome.body)
                    .observed(disk.body, disk.mtime, disk.hash)
            }
            Some(prev) => {
                Document::loaded(key.clone(), disk.body, disk.mtime, disk.hash).continuing(prev)
            }
        };
        Ok(Some(doc))
    }

    /// Persist documents as one logical write, in the given order
    ///
    /// Returns the documents as written: merged with any external edits
    /// and marked clean.
    ///
    /// # Errors
    /// - `CacheError::FlushFailed` if locking or writing fails; nothing
    ///   is partially written
    /// - `CacheError::Parse` if a target was externally corrupted
    pub async fn push(&self, docs: &[Arc<Document>]) -> Result<Vec<Document>, CacheError> {
        let Some(subject) = docs.last().map(|doc| doc.key().clone()) else {
            return Ok(Vec::new());
        };

        let mut lock_order: Vec<&DocKey> = docs.iter().map(|doc| doc.key()).collect();
        lock_order.sort();
        let mut locks = Vec::with_capacity(lock_order.len());
        for key in lock_order {
            let lock = self
                .adapter
                .lock(key)
                .await
                .map_err(|e| CacheError::flush_failed(key, e))?;
            locks.push(lock);
        }

        let mut merged = Vec::with_capacity(docs.len());
        for doc in docs {
            merged.push(self.reconcile_with_disk(doc).await?);
        }

        let targets: Vec<(DocKey, &Body)> = merged
            .iter()
            .map(|doc| (doc.key().clone(), doc.body()))
            .collect();
        let persisted = self
            .adapter
            .persist(&targets)
            .await
            .map_err(|e| CacheError::flush_failed(&subject, e))?;
        drop(locks);

        Ok(merged
            .into_iter()
            .zip(persisted)
            .map(|(doc, written)| doc.synced(written.mtime, written.hash))
            .collect())
    }

    /// Fold external edits made since `doc` was last observed
    async fn reconcile_with_disk(&self, doc: &Document) -> Result<Document, CacheError> {
        let key = doc.key();
        let disk = self
            .adapter
            .load(key)
            .await
            .map_err(|e| CacheError::from_adapter(key, e))?;
        let Some(disk) = disk else {
            return Ok(doc.clone());
        };
        if doc.source_mtime() == Some(disk.mtime) && doc.source_hash() == Some(disk.hash) {
            return Ok(doc.clone());
        }

        let outcome = merge(doc.base(), doc.body(), &disk.body);
        info!(
            key = %key,
            added = outcome.added,
            promoted = outcome.promoted,
            "external change detected during flush"
        );
        Ok(doc.reconciled(outcome.body))
    }
}
