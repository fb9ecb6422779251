//! Background flush handles
//!
//! A flush runs in its own task. It can be cancelled while it waits for the
//! per-key write section; once the write stage starts it runs to completion
//! even if every handle is dropped.

use crate::error::CacheError;
use docsync_adapter::StoreError;
use docsync_model::DocKey;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

const PENDING: u8 = 0;
const WRITING: u8 = 1;
const CANCELLED: u8 = 2;

/// Observable stage of a background flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    /// Waiting for the write section; cancellable
    Pending,
    /// Write stage started; runs to completion
    Writing,
    /// Cancelled before writing
    Cancelled,
}

/// Shared cancel/start flag between a handle and its task
#[derive(Debug, Default)]
pub(crate) struct FlushState(AtomicU8);

impl FlushState {
    /// Enter the write stage; false if already cancelled
    pub(crate) fn begin_write(&self) -> bool {
        self.0
            .compare_exchange(PENDING, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cancel(&self) -> bool {
        self.0
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn phase(&self) -> FlushPhase {
        match self.0.load(Ordering::Acquire) {
            PENDING => FlushPhase::Pending,
            WRITING => FlushPhase::Writing,
            _ => FlushPhase::Cancelled,
        }
    }
}

/// Handle to a flush running in the background
///
/// Dropping the handle detaches the flush; it still completes.
#[derive(Debug)]
#[must_use = "dropping the handle detaches the flush; call `wait` for its result"]
pub struct FlushHandle {
    key: DocKey,
    state: Arc<FlushState>,
    task: JoinHandle<Result<(), CacheError>>,
}

impl FlushHandle {
    pub(crate) fn new(
        key: DocKey,
        state: Arc<FlushState>,
        task: JoinHandle<Result<(), CacheError>>,
    ) -> Self {
        Self { key, state, task }
    }

    /// Key being flushed (the primary key of a linked flush)
    #[inline]
    #[must_use]
    pub fn key(&self) -> &DocKey {
        &self.key
    }

    /// Current stage
    #[inline]
    #[must_use]
    pub fn phase(&self) -> FlushPhase {
        self.state.phase()
    }

    /// Cancel the flush if its write stage has not started
    ///
    /// Returns `true` if cancelled; the document stays dirty.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.cancel();
        if cancelled {
            tracing::debug!(key = %self.key, "flush cancelled before write");
        }
        cancelled
    }

    /// Whether the flush task has finished
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the flush result
    ///
    /// # Errors
    /// - `CacheError::Cancelled` if cancelled before writing
    /// - Any error the flush itself produced
    pub async fn wait(self) -> Result<(), CacheError> {
        match self.task.await {
            Ok(result) => result,
            Err(join) => Err(CacheError::flush_failed(
                &self.key,
                StoreError::Worker(join.to_string()),
            )),
        }
    }
}
