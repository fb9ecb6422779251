//! Periodic trigger worker
//!
//! Runs archival passes for a fixed set of keys on a Tokio interval.
//! Controlled through an mpsc command channel; flushes every dirty
//! document on shutdown.

use crate::config::TriggerConfig;
use crate::error::TriggerError;
use crate::trigger::TaskCompletionTrigger;
use docsync_cache::FlushReport;
use docsync_model::DocKey;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Commands accepted by a running worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCommand {
    /// Scan every key now, even while paused
    ScanNow,
    /// Stop periodic scans
    Pause,
    /// Restart periodic scans
    Resume,
    /// Flush and stop
    Shutdown,
}

/// Totals reported when the worker stops
#[derive(Debug, Default)]
pub struct WorkerReport {
    /// Scans of the full key set
    pub scans: u64,
    /// Lines archived across all scans
    pub archived: usize,
    /// Passes that failed
    pub failures: u64,
    /// Result of the shutdown flush
    pub final_flush: FlushReport,
}

/// Handle to a background trigger worker
#[derive(Debug)]
pub struct TriggerWorker {
    sender: mpsc::Sender<TriggerCommand>,
    task: JoinHandle<WorkerReport>,
}

impl TriggerWorker {
    /// Spawn the worker; the first scan runs immediately
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(trigger: TaskCompletionTrigger, config: &TriggerConfig) -> Self {
        let (sender, rx) = mpsc::channel(32);
        let keys = config.keys.clone();
        let interval = config.scan_interval;
        let task = tokio::spawn(worker_loop(trigger, keys, interval, rx));
        Self { sender, task }
    }

    /// Send a command
    ///
    /// # Errors
    /// Returns `TriggerError::WorkerStopped` if the worker has exited.
    pub async fn send(&self, command: TriggerCommand) -> Result<(), TriggerError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| TriggerError::WorkerStopped)
    }

    /// Request an immediate scan
    ///
    /// # Errors
    /// Returns `TriggerError::WorkerStopped` if the worker has exited.
    pub async fn scan_now(&self) -> Result<(), TriggerError> {
        self.send(TriggerCommand::ScanNow).await
    }

    /// Stop after flushing, returning the worker's totals
    ///
    /// Commands sent earlier are processed first.
    ///
    /// # Errors
    /// Returns `TriggerError::WorkerStopped` if the worker task panicked.
    pub async fn shutdown(self) -> Result<WorkerReport, TriggerError> {
        // A closed channel also stops the loop.
        let _ = self.sender.send(TriggerCommand::Shutdown).await;
        self.task.await.map_err(|_| TriggerError::WorkerStopped)
    }
}

async fn worker_loop(
    trigger: TaskCompletionTrigger,
    keys: Vec<DocKey>,
    interval: std::time::Duration,
    mut rx: mpsc::Receiver<TriggerCommand>,
) -> WorkerReport {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut paused = false;
    let mut report = WorkerReport::default();
    info!(keys = keys.len(), interval_secs = interval.as_secs(), "trigger worker started");

    loop {
        tokio::select! {
            _ = ticker.tick(), if !paused => scan(&trigger, &keys, &mut report).await,
            command = rx.recv() => match command {
                Some(TriggerCommand::ScanNow) => scan(&trigger, &keys, &mut report).await,
                Some(TriggerCommand::Pause) => {
                    debug!("trigger worker paused");
                    paused = true;
                }
                Some(TriggerCommand::Resume) => {
                    debug!("trigger worker resumed");
                    paused = false;
                }
                Some(TriggerCommand::Shutdown) | None => break,
            },
        }
    }

    report.final_flush = trigger.cache().flush_all().await;
    info!(
        scans = report.scans,
        archived = report.archived,
        failures = report.failures,
        "trigger worker stopped"
    );
    report
}

async fn scan(trigger: &TaskCompletionTrigger, keys: &[DocKey], report: &mut WorkerReport) {
    report.scans += 1;
    for key in keys {
        match trigger.run_once(key).await {
            Ok(outcome) => report.archived += outcome.archived,
            Err(TriggerError::Cache(e)) if e.is_not_found() => {
                debug!(key = %key, "nothing to scan yet");
            }
            Err(e) => {
                report.failures += 1;
                warn!(key = %key, error = %e, "archival pass failed");
            }
        }
    }
}
