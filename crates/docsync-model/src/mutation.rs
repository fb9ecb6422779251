//! Atomic document mutations
//!
//! A [`Mutation`] is a semantic edit on a [`Body`]: not a text patch, but a
//! status transition or append addressed by entry index. Mutations are
//! validated against the current body; a rejected mutation leaves the body
//! untouched when applied through [`Mutation::applied_to`].

use crate::line::{Body, Entry, LineRecord, LineStatus, Stamp};
use serde::{Deserialize, Serialize};

/// Marker that introduces the archived suffix on a task line
pub const ARCHIVED_MARKER: &str = "<!-- archived ";

/// Semantic edit on a document body
///
/// `line` fields are 0-based entry indices (passthrough lines count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Pending → completed
    Complete { line: usize, at: Stamp },

    /// Completed → pending
    Reopen { line: usize },

    /// Completed → archived
    Archive { line: usize, at: Stamp },

    /// Append a pending task
    AppendTask { text: String },

    /// Append an archived record (archive documents)
    ///
    /// Whether the completion is already archived is the caller's call: a
    /// recurring task can be archived once per completion.
    AppendArchived { record: LineRecord },

    /// Append a passthrough line
    AppendRaw { line: String },

    /// Replace the text of a non-archived task
    EditText { line: usize, text: String },

    /// Several mutations applied all-or-nothing
    Batch { mutations: Vec<Mutation> },
}

impl Mutation {
    /// Batch constructor
    #[inline]
    #[must_use]
    pub fn batch(mutations: Vec<Mutation>) -> Self {
        Self::Batch { mutations }
    }

    /// Short operation name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Complete { .. } => "complete",
            Self::Reopen { .. } => "reopen",
            Self::Archive { .. } => "archive",
            Self::AppendTask { .. } => "append_task",
            Self::AppendArchived { .. } => "append_archived",
            Self::AppendRaw { .. } => "append_raw",
            Self::EditText { .. } => "edit_text",
            Self::Batch { .. } => "batch",
        }
    }

    /// Apply to a copy of `body`, returning the new body
    ///
    /// # Errors
    /// Returns the first validation failure; `body` is never modified.
    pub fn applied_to(&self, body: &Body) -> Result<Body, MutationError> {
        let mut next = body.clone();
        self.apply(&mut next)?;
        Ok(next)
    }

    /// Apply in place
    ///
    /// A failing `Batch` may leave earlier steps applied; use
    /// [`Mutation::applied_to`] for all-or-nothing semantics.
    ///
    /// # Errors
    /// Returns error if the mutation is invalid for the current body.
    pub fn apply(&self, body: &mut Body) -> Result<(), MutationError> {
        match self {
            Self::Complete { line, at } => {
                let task = task_mut(body, *line)?;
                transition(task, *line, LineStatus::Completed)?;
                task.completed_at = Some(*at);
            }
            Self::Reopen { line } => {
                let task = task_mut(body, *line)?;
                transition(task, *line, LineStatus::Pending)?;
                task.completed_at = None;
            }
            Self::Archive { line, at } => {
                let task = task_mut(body, *line)?;
                transition(task, *line, LineStatus::Archived)?;
                task.archived_at = Some(*at);
            }
            Self::AppendTask { text } => {
                let text = validate_text(text)?;
                body.entries.push(Entry::Task(LineRecord::pending(text)));
            }
            Self::AppendArchived { record } => {
                if record.status != LineStatus::Archived || record.archived_at.is_none() {
                    return Err(MutationError::InvalidRecord(format!(
                        "expected archived record with archive stamp, got {}",
                        record.status
                    )));
                }
                validate_text(&record.text)?;
                body.entries.push(Entry::Task(record.clone()));
            }
            Self::AppendRaw { line } => {
                if line.contains(['\n', '\r']) {
                    return Err(MutationError::InvalidText(line.clone()));
                }
                if line.trim_start().starts_with("- [") {
                    return Err(MutationError::InvalidText(format!(
                        "raw line looks like a task: {line}"
                    )));
                }
                body.entries.push(Entry::raw(line.clone()));
            }
            Self::EditText { line, text } => {
                let text = validate_text(text)?;
                let task = task_mut(body, *line)?;
                if task.status.is_terminal() {
                    return Err(MutationError::Terminal { line: *line });
                }
                if task.text == text {
                    return Err(MutationError::NoChange);
                }
                task.text = text;
            }
            Self::Batch { mutations } => {
                if mutations.is_empty() {
                    return Err(MutationError::NoChange);
                }
                for mutation in mutations {
                    mutation.apply(body)?;
                }
            }
        }
        Ok(())
    }
}

fn task_mut(body: &mut Body, line: usize) -> Result<&mut LineRecord, MutationError> {
    let len = body.entries.len();
    body.entries
        .get_mut(line)
        .ok_or(MutationError::LineOutOfRange { line, len })?
        .as_task_mut()
        .ok_or(MutationError::NotATask { line })
}

fn transition(task: &mut LineRecord, line: usize, to: LineStatus) -> Result<(), MutationError> {
    let from = task.status;
    if from.is_terminal() {
        return Err(MutationError::Terminal { line });
    }
    if !from.can_transition_to(to) {
        return Err(MutationError::InvalidTransition { line, from, to });
    }
    task.status = to;
    Ok(())
}

fn validate_text(text: &str) -> Result<String, MutationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains(['\n', '\r']) || trimmed.contains(ARCHIVED_MARKER) {
        return Err(MutationError::InvalidText(text.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Rejected mutation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// Entry index past the end of the document
    #[error("line {line} out of range (document has {len} lines)")]
    LineOutOfRange { line: usize, len: usize },

    /// Entry is passthrough content
    #[error("line {line} is not a task")]
    NotATask { line: usize },

    /// Archived lines are terminal
    #[error("line {line} is archived and cannot change")]
    Terminal { line: usize },

    /// Status change not allowed
    #[error("line {line}: cannot move from {from} to {to}")]
    InvalidTransition {
        line: usize,
        from: LineStatus,
        to: LineStatus,
    },

    /// Text empty, multi-line, or carrying reserved markers
    #[error("invalid task text: '{0}'")]
    InvalidText(String),

    /// Record not valid for this operation
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Mutation would leave the document unchanged
    #[error("mutation does not change the document")]
    NoChange,
}
