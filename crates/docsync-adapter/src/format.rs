//! Line-oriented task list format
//!
//! ```text
//! - [ ] buy milk                                           pending
//! - [x] call client (2025-01-01)                           completed
//! - [x] call client (2025-01-01) <!-- archived 2025-01-02T09:00:00Z -->
//! anything else                                            passthrough
//! ```
//!
//! Parsing is lossless for task lines and every passthrough line: a
//! completion stamp not written in canonical form stays part of the task
//! text. `[X]` is read as completed and written back as `[x]`.

use crate::error::ParseError;
use docsync_model::{Body, Entry, LineRecord, LineStatus, Stamp, ARCHIVED_MARKER};
use std::path::Path;

const TASK_PREFIX: &str = "- [";
const ARCHIVED_CLOSE: &str = " -->";

/// Format trait for converting raw file text into document bodies
///
/// Implement this trait to add support for other task syntaxes.
pub trait DocumentFormat: Send + Sync + 'static {
    /// Parse raw text
    ///
    /// # Errors
    /// Returns error on malformed status markers.
    fn parse(&self, content: &str) -> Result<Body, ParseError>;

    /// Render a body back to raw text
    fn render(&self, body: &Body) -> String;

    /// Supported file extensions (without dot)
    fn extensions(&self) -> &[&str];

    /// Check if this format handles the given path
    fn can_parse(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions().contains(&ext))
            .unwrap_or(false)
    }
}

/// Markdown-style checkbox task lists
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskListFormat;

impl TaskListFormat {
    /// Create new task list format
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn parse_line(line_no: usize, line: &str) -> Result<Entry, ParseError> {
        let body = line.trim_start_matches([' ', '\t']);
        let indent = &line[..line.len() - body.len()];

        let Some(rest) = body.strip_prefix(TASK_PREFIX) else {
            return Ok(Entry::raw(line));
        };
        let mut chars = rest.chars();
        let (Some(marker), Some(']')) = (chars.next(), chars.next()) else {
            // Links and other bracketed bullets: `- [label](url)`
            return Ok(Entry::raw(line));
        };
        let status = match marker {
            ' ' => LineStatus::Pending,
            'x' | 'X' => LineStatus::Completed,
            other => {
                return Err(ParseError::MalformedMarker {
                    line: line_no,
                    marker: other,
                    content: line.to_string(),
                })
            }
        };
        let Some(text) = chars.as_str().strip_prefix(' ') else {
            return Ok(Entry::raw(line));
        };
        if text.trim().is_empty() {
            return Ok(Entry::raw(line));
        }

        let (text, archived_at) = Self::split_archived(line_no, text)?;
        if archived_at.is_some() && status == LineStatus::Pending {
            return Err(ParseError::ArchivedPending {
                line: line_no,
                content: line.to_string(),
            });
        }

        let mut record = LineRecord::pending(text);
        record.indent = indent.to_string();
        if status == LineStatus::Completed {
            let (text, completed_at) = Self::split_completed(text);
            record.text = text.to_string();
            record.completed_at = completed_at;
            record.status = if archived_at.is_some() {
                LineStatus::Archived
            } else {
                LineStatus::Completed
            };
            record.archived_at = archived_at;
        }
        Ok(Entry::Task(record))
    }

    /// Strip a trailing `<!-- archived STAMP -->`
    fn split_archived(line_no: usize, text: &str) -> Result<(&str, Option<Stamp>), ParseError> {
        let Some(without_close) = text.strip_suffix(ARCHIVED_CLOSE) else {
            return Ok((text, None));
        };
        let Some(start) = without_close.rfind(ARCHIVED_MARKER) else {
            return Ok((text, None));
        };
        let raw_stamp = &without_close[start + ARCHIVED_MARKER.len()..];
        let stamp = Stamp::parse(raw_stamp).ok_or_else(|| ParseError::BadStamp {
            line: line_no,
            stamp: raw_stamp.to_string(),
        })?;
        let head = without_close[..start].strip_suffix(' ').unwrap_or(&without_close[..start]);
        Ok((head, Some(stamp)))
    }

    /// Strip a trailing ` (STAMP)` if it parses as a timestamp
    fn split_completed(text: &str) -> (&str, Option<Stamp>) {
        let Some(without_paren) = text.strip_suffix(')') else {
            return (text, None);
        };
        let Some(open) = without_paren.rfind(" (") else {
            return (text, None);
        };
        match Stamp::parse(&without_paren[open + 2..]) {
            Some(stamp) if open > 0 => (&text[..open], Some(stamp)),
            _ => (text, None),
        }
    }

    fn render_task(record: &LineRecord, out: &mut String) {
        let marker = if record.status == LineStatus::Pending { ' ' } else { 'x' };
        out.push_str(&record.indent);
        out.push_str(TASK_PREFIX);
        out.push(marker);
        out.push_str("] ");
        out.push_str(&record.text);
        if record.status != LineStatus::Pending {
            if let Some(at) = record.completed_at {
                out.push_str(&format!(" ({at})"));
            }
        }
        if record.status == LineStatus::Archived {
            if let Some(at) = record.archived_at {
                out.push_str(&format!(" {ARCHIVED_MARKER}{at}{ARCHIVED_CLOSE}"));
            }
        }
    }
}

impl DocumentFormat for TaskListFormat {
    fn parse(&self, content: &str) -> Result<Body, ParseError> {
        if content.is_empty() {
            return Ok(Body {
                entries: Vec::new(),
                trailing_newline: false,
            });
        }
        let trailing_newline = content.ends_with('\n');
        let content = content.strip_suffix('\n').unwrap_or(content);
        let entries = content
            .split('\n')
            .enumerate()
            .map(|(idx, line)| Self::parse_line(idx + 1, line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Body {
            entries,
            trailing_newline,
        })
    }

    fn render(&self, body: &Body) -> String {
        let mut out = String::new();
        for (idx, entry) in body.entries.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            match entry {
                Entry::Task(record) => Self::render_task(record, &mut out),
                Entry::Passthrough { raw } => out.push_str(raw),
            }
        }
        if body.trailing_newline && !body.entries.is_empty() {
            out.push('\n');
        }
        out
    }

    fn extensions(&self) -> &[&str] {
        &["md", "markdown", "txt", "todo"]
    }
}
