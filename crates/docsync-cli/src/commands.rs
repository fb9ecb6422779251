//! Subcommand implementations
//!
//! Each command runs against a [`DocumentCache`] and returns the text to
//! print, so the binary only parses arguments and writes output.

use anyhow::Context;
use docsync_adapter::{DocumentFormat, TaskListFormat};
use docsync_cache::DocumentCache;
use docsync_model::{DocKey, Mutation, Stamp};
use docsync_trigger::{TaskCompletionTrigger, TriggerConfig, TriggerWorker, WorkerReport};
use std::fmt::Write as _;
use std::future::Future;
use tracing::info;

/// Parse a document key given on the command line
///
/// # Errors
/// Fails for absolute paths, `..` segments and empty keys.
pub fn parse_key(raw: &str) -> anyhow::Result<DocKey> {
    DocKey::new(raw).with_context(|| format!("invalid document key '{raw}'"))
}

/// Numbered listing of a document, or its JSON form
///
/// # Errors
/// Fails if the document cannot be loaded.
pub async fn show(cache: &DocumentCache, key: &DocKey, json: bool) -> anyhow::Result<String> {
    let doc = cache.get(key).await?;
    if json {
        return Ok(serde_json::to_string_pretty(&*doc)?);
    }

    let mut out = String::new();
    let state = if doc.is_dirty() { ", unsaved" } else { "" };
    writeln!(out, "{} (version {}{state})", doc.key(), doc.version())?;
    for (index, line) in TaskListFormat::new().render(doc.body()).lines().enumerate() {
        writeln!(out, "{index:>4}  {line}")?;
    }
    Ok(out)
}

/// Mark the task at `line` completed today and save
///
/// # Errors
/// Fails if the line is not a pending task or the save fails.
pub async fn complete(cache: &DocumentCache, key: &DocKey, line: usize) -> anyhow::Result<String> {
    let doc = cache.get(key).await?;
    let version = cache
        .apply(key, Mutation::Complete { line, at: Stamp::today() }, doc.version())
        .await?;
    cache.flush(key).await?;
    info!(key = %key, line, version, "task completed");
    Ok(format!("completed line {line} of {key} (version {version})\n"))
}

/// Append a pending task and save, creating the document if needed
///
/// # Errors
/// Fails if the text is empty or the save fails.
pub async fn add(cache: &DocumentCache, key: &DocKey, text: &str) -> anyhow::Result<String> {
    let doc = cache.get_or_create(key).await?;
    let version = cache
        .apply(key, Mutation::AppendTask { text: text.to_string() }, doc.version())
        .await?;
    cache.flush(key).await?;
    Ok(format!("added task to {key} (version {version})\n"))
}

/// Run one archival pass
///
/// # Errors
/// Fails if the pass gives up or a save fails.
pub async fn archive(
    trigger: &TaskCompletionTrigger,
    key: &DocKey,
    json: bool,
) -> anyhow::Result<String> {
    let outcome = trigger.run_once(key).await?;
    if json {
        return Ok(serde_json::to_string_pretty(&outcome)?);
    }
    Ok(format!(
        "archived {} task(s) from {} into {} ({} already archived)\n",
        outcome.archived, outcome.key, outcome.archive_key, outcome.already_archived
    ))
}

/// Run the trigger worker until `stop` resolves, then flush and report
///
/// # Errors
/// Fails if the worker stops unexpectedly.
pub async fn watch(
    trigger: TaskCompletionTrigger,
    config: &TriggerConfig,
    stop: impl Future<Output = ()>,
) -> anyhow::Result<String> {
    let worker = TriggerWorker::spawn(trigger, config);
    stop.await;
    let report = worker.shutdown().await?;
    Ok(summarize(&report))
}

fn summarize(report: &WorkerReport) -> String {
    let mut out = format!(
        "{} scan(s), {} task(s) archived, {} failed pass(es)\n",
        report.scans, report.archived, report.failures
    );
    for (key, error) in &report.final_flush.failed {
        let _ = writeln!(out, "unsaved: {key}: {error}");
    }
    out
}
