//! Error types for the Task Completion Trigger

use docsync_cache::CacheError;
use docsync_model::DocKey;

/// Errors from archival passes and the trigger worker
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// Cache operation failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Every re-scan hit a version conflict
    #[error("gave up archiving '{key}' after {attempts} conflicting attempts")]
    RetriesExhausted { key: DocKey, attempts: u32 },

    /// Worker task is no longer running
    #[error("trigger worker stopped")]
    WorkerStopped,
}

impl TriggerError {
    /// Check if this wraps a version conflict
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Cache(e) if e.is_conflict())
    }
}
