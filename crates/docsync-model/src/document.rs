//! Cached document record
//!
//! [`Document`] pairs a parsed [`Body`] with the version and sync metadata
//! the cache needs for optimistic concurrency and staleness detection.

use crate::hash::ContentHash;
use crate::key::DocKey;
use crate::line::{Body, Entry, LineRecord, LineStatus};
use crate::mutation::{Mutation, MutationError};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

/// In-memory representation of one backing file
///
/// # Invariants
/// - `version` strictly increases with every committed change
/// - `dirty` is set by [`Document::commit`] and cleared only by
///   [`Document::synced`] after a successful flush
/// - Values are immutable once shared; changes produce a new `Document`
/// - `base` is the body last seen on disk, the common ancestor for merges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    key: DocKey,
    body: Body,
    #[serde(skip)]
    base: Option<Arc<Body>>,
    version: u64,
    #[serde(skip)]
    source_mtime: Option<SystemTime>,
    source_hash: Option<ContentHash>,
    dirty: bool,
}

impl Document {
    /// New document that exists only in memory
    ///
    /// Starts dirty so the first flush creates the backing file.
    #[must_use]
    pub fn created(key: DocKey) -> Self {
        Self {
            key,
            body: Body::empty(),
            base: None,
            version: 0,
            source_mtime: None,
            source_hash: None,
            dirty: true,
        }
    }

    /// Document freshly loaded from disk
    #[must_use]
    pub fn loaded(key: DocKey, body: Body, mtime: SystemTime, hash: ContentHash) -> Self {
        Self {
            key,
            base: Some(Arc::new(body.clone())),
            body,
            version: 0,
            source_mtime: Some(mtime),
            source_hash: Some(hash),
            dirty: false,
        }
    }

    /// Body as last read from or written to disk
    #[inline]
    #[must_use]
    pub fn base(&self) -> Option<&Body> {
        self.base.as_deref()
    }

    /// Document key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &DocKey {
        &self.key
    }

    /// Parsed content
    #[inline]
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Lines in file order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.body.entries
    }

    /// Current version
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Modification time of the backing file at last load or flush
    #[inline]
    #[must_use]
    pub fn source_mtime(&self) -> Option<SystemTime> {
        self.source_mtime
    }

    /// Hash of the backing file at last load or flush
    #[inline]
    #[must_use]
    pub fn source_hash(&self) -> Option<ContentHash> {
        self.source_hash
    }

    /// Whether the cache holds changes not yet on disk
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Task at entry index
    #[must_use]
    pub fn task(&self, line: usize) -> Option<&LineRecord> {
        self.body.entries.get(line).and_then(Entry::as_task)
    }

    /// Tasks with their entry index
    pub fn tasks(&self) -> impl Iterator<Item = (usize, &LineRecord)> {
        self.body.tasks()
    }

    /// Indices of completed (not yet archived) tasks
    #[must_use]
    pub fn completed_lines(&self) -> Vec<usize> {
        self.body.indices_with_status(LineStatus::Completed)
    }

    /// Apply a mutation, producing the next version
    ///
    /// # Errors
    /// Returns error if the mutation is invalid; `self` is unchanged.
    pub fn commit(&self, mutation: &Mutation) -> Result<Self, MutationError> {
        let body = mutation.applied_to(&self.body)?;
        Ok(Self {
            body,
            version: self.version + 1,
            dirty: true,
            ..self.clone()
        })
    }

    /// Replace the body with reconciled content
    ///
    /// Bumps the version only when the content actually changes.
    #[must_use]
    pub fn reconciled(&self, body: Body) -> Self {
        let version = if body == self.body {
            self.version
        } else {
            self.version + 1
        };
        Self {
            body,
            version,
            ..self.clone()
        }
    }

    /// Mark the document as matching the backing file
    #[must_use]
    pub fn synced(self, mtime: SystemTime, hash: ContentHash) -> Self {
        Self {
            base: Some(Arc::new(self.body.clone())),
            source_mtime: Some(mtime),
            source_hash: Some(hash),
            dirty: false,
            ..self
        }
    }

    /// Record the disk state without clearing `dirty`
    ///
    /// Used after external changes were merged into a dirty document;
    /// `disk` becomes the base for the next merge.
    #[must_use]
    pub fn observed(self, disk: Body, mtime: SystemTime, hash: ContentHash) -> Self {
        Self {
            base: Some(Arc::new(disk)),
            source_mtime: Some(mtime),
            source_hash: Some(hash),
            ..self
        }
    }

    /// Carry a previous version forward on reload
    ///
    /// Unchanged content keeps the version; changed content moves past it.
    #[must_use]
    pub fn continuing(self, previous: &Self) -> Self {
        let version = if self.body == previous.body {
            previous.version
        } else {
            previous.version + 1
        };
        Self { version, ..self }
    }
}
