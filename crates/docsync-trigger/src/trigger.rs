//! Task Completion Trigger
//!
//! Moves completed tasks to the archive document. Every read and write goes
//! through the [`DocumentCache`]; this crate has no access to the store.
//!
//! # Archival pass
//! 1. `get` the primary document and collect completed lines
//! 2. Append archived copies to the archive document, skipping entries
//!    already archived for the same completion
//! 3. Mark the lines archived in the primary, at the version read in step 1
//! 4. Flush both documents as one logical write
//!
//! A version conflict in step 2 or 3 restarts the pass from step 1; the
//! skip in step 2 keeps repeated passes from duplicating archive entries.

use crate::config::TriggerConfig;
use crate::error::TriggerError;
use docsync_cache::{CacheError, DocumentCache};
use docsync_model::{DocKey, LineRecord, Mutation, Stamp};
use serde::Serialize;
use tracing::{debug, info};

/// Result of one archival pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    /// Primary document
    pub key: DocKey,
    /// Archive document
    pub archive_key: DocKey,
    /// Lines transitioned to archived
    pub archived: usize,
    /// Archive entries skipped as already present
    pub already_archived: usize,
    /// Primary version after the pass
    pub version: u64,
    /// Passes needed, counting conflict re-scans
    pub attempts: u32,
}

/// Archives completed tasks through the cache
#[derive(Debug, Clone)]
pub struct TaskCompletionTrigger {
    cache: DocumentCache,
    max_conflict_retries: u32,
}

impl TaskCompletionTrigger {
    /// Create trigger over a cache
    #[must_use]
    pub fn new(cache: DocumentCache, config: &TriggerConfig) -> Self {
        Self {
            cache,
            max_conflict_retries: config.max_conflict_retries,
        }
    }

    /// Cache this trigger routes through
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    /// Archive every completed task in `key` and flush
    ///
    /// # Errors
    /// - `TriggerError::RetriesExhausted` if conflicts outlast the retry budget
    /// - `TriggerError::Cache` for load, parse and flush failures
    pub async fn run_once(&self, key: &DocKey) -> Result<ArchiveOutcome, TriggerError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.archive_pass(key, attempts).await {
                Err(CacheError::Conflict { .. }) if attempts <= self.max_conflict_retries => {
                    debug!(key = %key, attempts, "archival raced another writer, re-scanning");
                }
                Err(CacheError::Conflict { .. }) => {
                    return Err(TriggerError::RetriesExhausted {
                        key: key.clone(),
                        attempts,
                    });
                }
                other => return other.map_err(TriggerError::from),
            }
        }
    }

    async fn archive_pass(&self, key: &DocKey, attempts: u32) -> Result<ArchiveOutcome, CacheError> {
        let doc = self.cache.get(key).await?;
        let archive_key = self.cache.archive_key(key);
        let completed = doc.completed_lines();

        let mut outcome = ArchiveOutcome {
            key: key.clone(),
            archive_key: archive_key.clone(),
            archived: 0,
            already_archived: 0,
            version: doc.version(),
            attempts,
        };
        if completed.is_empty() {
            self.finish_pending(key, &archive_key).await?;
            return Ok(outcome);
        }

        let at = Stamp::now();
        let records: Vec<LineRecord> = completed
            .iter()
            .filter_map(|&line| doc.task(line))
            .map(|task| task.archived_copy(at))
            .collect();

        // Archive entries beyond the primary's own archived lines were
        // appended by a pass whose primary update never landed.
        let archive = self.cache.get_or_create(&archive_key).await?;
        let mut fresh: Vec<LineRecord> = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let surplus = archive
                .body()
                .archived_count(record)
                .saturating_sub(doc.body().archived_count(record));
            let earlier = records[..idx]
                .iter()
                .filter(|seen| seen.same_completion(record))
                .count();
            if earlier < surplus {
                outcome.already_archived += 1;
            } else {
                fresh.push(record.clone());
            }
        }
        if !fresh.is_empty() {
            let appends = fresh
                .into_iter()
                .map(|record| Mutation::AppendArchived { record })
                .collect();
            self.cache
                .apply(&archive_key, Mutation::batch(appends), archive.version())
                .await?;
        }

        let transitions = completed
            .iter()
            .map(|&line| Mutation::Archive { line, at })
            .collect();
        outcome.version = self
            .cache
            .apply(key, Mutation::batch(transitions), doc.version())
            .await?;
        outcome.archived = completed.len();

        self.cache.flush_linked(key, &archive_key).await?;
        info!(
            key = %key,
            archive = %archive_key,
            archived = outcome.archived,
            skipped = outcome.already_archived,
            version = outcome.version,
            "archived completed tasks"
        );
        Ok(outcome)
    }

    /// Flush what an earlier, failed pass left dirty
    async fn finish_pending(&self, key: &DocKey, archive_key: &DocKey) -> Result<(), CacheError> {
        let dirty = self.cache.dirty_keys();
        match (dirty.contains(key), dirty.contains(archive_key)) {
            (true, true) => self.cache.flush_linked(key, archive_key).await,
            (true, false) => self.cache.flush(key).await,
            (false, true) => self.cache.flush(archive_key).await,
            (false, false) => Ok(()),
        }
    }
}
