//! Error types for the File Adapter
//!
//! Provides error handling for:
//! - Parse operations (raw text → Body)
//! - Store operations (read, stat, lock, atomic write)

use docsync_model::DocKey;
use std::path::PathBuf;

/// Errors while parsing the line-oriented task format
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Status marker other than ` `, `x` or `X`
    #[error("line {line}: malformed status marker '[{marker}]' in '{content}'")]
    MalformedMarker {
        line: usize,
        marker: char,
        content: String,
    },

    /// Archived suffix on an open task
    #[error("line {line}: pending task carries an archived suffix: '{content}'")]
    ArchivedPending { line: usize, content: String },

    /// Archived suffix with an unreadable timestamp
    #[error("line {line}: invalid archive timestamp '{stamp}'")]
    BadStamp { line: usize, stamp: String },
}

impl ParseError {
    /// 1-based line number of the failure
    #[inline]
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::MalformedMarker { line, .. }
            | Self::ArchivedPending { line, .. }
            | Self::BadStamp { line, .. } => *line,
        }
    }
}

/// Errors from the document store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error on a store path
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another writer held the lock for too long
    #[error("timed out waiting for store lock on '{key}'")]
    LockTimeout { key: DocKey },

    /// Blocking worker panicked or was shut down
    #[error("store worker failed: {0}")]
    Worker(String),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced by [`crate::FileAdapter`]
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Backing file is malformed
    #[error("parse error in '{key}': {source}")]
    Parse {
        key: DocKey,
        #[source]
        source: ParseError,
    },

    /// Store access failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
