//! Error types for the Document Cache
//!
//! Every error is local to one key's operation:
//! - `NotFound`, `Parse`: reported for explicit handling (create vs. skip)
//! - `Conflict`: optimistic version mismatch, never resolved silently
//! - `FlushFailed`: the document stays dirty and in memory
//! - `Rejected`: the mutation is invalid for the current content

use docsync_adapter::{AdapterError, ParseError, StoreError};
use docsync_model::{DocKey, MutationError};

/// Errors from cache and sync operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No backing file and no in-memory document
    #[error("document not found: '{key}'")]
    NotFound { key: DocKey },

    /// Caller's expected version is out of date
    #[error("version conflict on '{key}': expected {expected}, current {actual}")]
    Conflict {
        key: DocKey,
        expected: u64,
        actual: u64,
    },

    /// Backing file is malformed
    #[error("parse error in '{key}': {source}")]
    Parse {
        key: DocKey,
        #[source]
        source: ParseError,
    },

    /// Persisting pending changes failed
    #[error("flush of '{key}' failed: {source}")]
    FlushFailed {
        key: DocKey,
        #[source]
        source: StoreError,
    },

    /// Mutation is invalid for the current document
    #[error("mutation rejected on '{key}': {source}")]
    Rejected {
        key: DocKey,
        #[source]
        source: MutationError,
    },

    /// Background flush was cancelled before writing
    #[error("flush of '{key}' cancelled")]
    Cancelled { key: DocKey },

    /// Reading the backing file failed
    #[error("store error on '{key}': {source}")]
    Store {
        key: DocKey,
        #[source]
        source: StoreError,
    },
}

impl CacheError {
    /// Create conflict error
    #[inline]
    pub fn conflict(key: &DocKey, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            key: key.clone(),
            expected,
            actual,
        }
    }

    /// Create flush failure
    #[inline]
    pub fn flush_failed(key: &DocKey, source: StoreError) -> Self {
        Self::FlushFailed {
            key: key.clone(),
            source,
        }
    }

    /// Map a load failure for `key`
    pub fn from_adapter(key: &DocKey, err: AdapterError) -> Self {
        match err {
            AdapterError::Parse { key, source } => Self::Parse { key, source },
            AdapterError::Store(source) => Self::Store {
                key: key.clone(),
                source,
            },
        }
    }

    /// Key the failed operation targeted
    #[must_use]
    pub fn key(&self) -> &DocKey {
        match self {
            Self::NotFound { key }
            | Self::Conflict { key, .. }
            | Self::Parse { key, .. }
            | Self::FlushFailed { key, .. }
            | Self::Rejected { key, .. }
            | Self::Cancelled { key }
            | Self::Store { key, .. } => key,
        }
    }

    /// Check if this is an optimistic concurrency failure
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this is a missing document
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if re-invoking the operation may succeed
    ///
    /// The cache never retries on its own; this only informs callers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::FlushFailed { .. } | Self::Cancelled { .. } => true,
            Self::Store { source, .. } => matches!(source, StoreError::LockTimeout { .. }),
            Self::NotFound { .. } | Self::Parse { .. } | Self::Rejected { .. } => false,
        }
    }
}
