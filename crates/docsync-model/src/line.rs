//! Line records and document bodies
//!
//! A document body is an ordered list of [`Entry`] values: either a task
//! ([`LineRecord`]) or a passthrough line kept verbatim.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Task status
///
/// Ordered by terminality: `Pending < Completed < Archived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    /// Open task (`- [ ]`)
    Pending,
    /// Done, still live in the document (`- [x]`)
    Completed,
    /// Done and recorded in the archive; terminal
    Archived,
}

impl LineStatus {
    /// Archived lines never change status again
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Archived)
    }

    /// The more terminal of two statuses
    #[inline]
    #[must_use]
    pub fn more_terminal(self, other: Self) -> Self {
        self.max(other)
    }

    /// Allowed single-step transitions
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Completed, Self::Pending)
                | (Self::Completed, Self::Archived)
        )
    }

    /// Lower-case name used in logs and CLI output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl Display for LineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp attached to a task line
///
/// Renders in exactly the form it was written in: a calendar date
/// (`2025-01-01`) or an RFC 3339 instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stamp {
    /// Calendar date
    Date(NaiveDate),
    /// Instant with its original offset
    Instant(DateTime<FixedOffset>),
}

impl Stamp {
    /// Current instant, truncated to whole seconds
    #[must_use]
    pub fn now() -> Self {
        let now = Utc::now();
        let secs = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self::Instant(secs.fixed_offset())
    }

    /// Today's date (UTC)
    #[must_use]
    pub fn today() -> Self {
        Self::Date(Utc::now().date_naive())
    }

    /// Parse a date or RFC 3339 instant written in canonical form
    ///
    /// Only text that renders back byte-for-byte is accepted, so `2025-1-1`
    /// or a `+00:00` offset stays part of the task text instead of being
    /// rewritten on the next flush.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let stamp = match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Self::Date(date),
            Err(_) => DateTime::parse_from_rfc3339(raw).ok().map(Self::Instant)?,
        };
        Some(stamp).filter(|stamp| stamp.to_string() == raw)
    }
}

impl Display for Stamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Instant(at) => {
                let utc = at.offset().local_minus_utc() == 0;
                f.write_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, utc))
            }
        }
    }
}

impl FromStr for Stamp {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| StampError(s.to_string()))
    }
}

impl Serialize for Stamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Stamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Unparseable timestamp
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp '{0}': expected YYYY-MM-DD or RFC 3339")]
pub struct StampError(pub String);

/// One task line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    /// Leading whitespace, preserved on write
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub indent: String,
    /// Task status
    pub status: LineStatus,
    /// Task payload without stamps
    pub text: String,
    /// Set when the task was completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Stamp>,
    /// Set when the task was archived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<Stamp>,
}

impl LineRecord {
    /// New pending task
    #[must_use]
    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            indent: String::new(),
            status: LineStatus::Pending,
            text: text.into(),
            completed_at: None,
            archived_at: None,
        }
    }

    /// New completed task
    #[must_use]
    pub fn completed(text: impl Into<String>, at: Option<Stamp>) -> Self {
        Self {
            status: LineStatus::Completed,
            completed_at: at,
            ..Self::pending(text)
        }
    }

    /// Archived copy of this record, as appended to an archive document
    #[must_use]
    pub fn archived_copy(&self, at: Stamp) -> Self {
        Self {
            indent: String::new(),
            status: LineStatus::Archived,
            text: self.text.clone(),
            completed_at: self.completed_at,
            archived_at: Some(at),
        }
    }

    /// Line identity used for merging and de-duplication
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &str {
        self.text.trim()
    }

    /// Whether `other` is the archive entry for the same completion
    #[must_use]
    pub fn same_completion(&self, other: &Self) -> bool {
        self.identity() == other.identity() && self.completed_at == other.completed_at
    }
}

/// One line of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// Status-tagged task
    Task(LineRecord),
    /// Any other line, kept verbatim
    Passthrough {
        /// Raw line content without line terminator
        raw: String,
    },
}

impl Entry {
    /// Passthrough entry
    #[inline]
    #[must_use]
    pub fn raw(line: impl Into<String>) -> Self {
        Self::Passthrough { raw: line.into() }
    }

    /// Task record, if this is a task
    #[inline]
    #[must_use]
    pub fn as_task(&self) -> Option<&LineRecord> {
        match self {
            Self::Task(record) => Some(record),
            Self::Passthrough { .. } => None,
        }
    }

    /// Mutable task record, if this is a task
    #[inline]
    pub fn as_task_mut(&mut self) -> Option<&mut LineRecord> {
        match self {
            Self::Task(record) => Some(record),
            Self::Passthrough { .. } => None,
        }
    }
}

/// Parsed content of one document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Body {
    /// Lines in file order
    pub entries: Vec<Entry>,
    /// Whether the file ended with a newline
    pub trailing_newline: bool,
}

impl Body {
    /// Empty body that will be written with a trailing newline
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            trailing_newline: true,
        }
    }

    /// Tasks with their entry index
    pub fn tasks(&self) -> impl Iterator<Item = (usize, &LineRecord)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| entry.as_task().map(|task| (idx, task)))
    }

    /// Indices of tasks in the given status
    #[must_use]
    pub fn indices_with_status(&self, status: LineStatus) -> Vec<usize> {
        self.tasks()
            .filter(|(_, task)| task.status == status)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Number of archived entries for the same completion
    #[must_use]
    pub fn archived_count(&self, record: &LineRecord) -> usize {
        self.tasks()
            .filter(|(_, task)| task.status == LineStatus::Archived && task.same_completion(record))
            .count()
    }
}
