//! Document keys
//!
//! Provides [`DocKey`], the identifier of one backing file inside a store.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Key of a document within a store namespace
///
/// A relative, `/`-separated path. Keys never escape the store root.
///
/// # Examples
/// - `today.md`
/// - `projects/alpha/tasks.md`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocKey(String);

impl DocKey {
    /// Create a validated key
    ///
    /// # Errors
    /// Returns error if the key is empty, absolute, or contains `.`/`..`
    /// or empty segments.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, KeyError> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        if raw.starts_with('/') || raw.contains('\\') || raw.contains(':') {
            return Err(KeyError::NotRelative(raw.to_string()));
        }
        for segment in raw.split('/') {
            match segment {
                "" => return Err(KeyError::EmptySegment(raw.to_string())),
                "." | ".." => return Err(KeyError::Traversal(raw.to_string())),
                s if s.contains('\0') => return Err(KeyError::InvalidSegment(s.to_string())),
                _ => {}
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Key as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments from root to file
    #[inline]
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Final segment (the file name)
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Directory part, if the key is nested
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.0.rfind('/').map(|idx| &self.0[..idx])
    }

    /// Key of the sibling archive document
    ///
    /// The suffix is inserted before the extension:
    /// `tasks/today.md` + `.archive` → `tasks/today.archive.md`.
    #[must_use]
    pub fn archive_sibling(&self, suffix: &str) -> Self {
        let name = self.file_name();
        let archived_name = match name.rfind('.') {
            Some(dot) if dot > 0 => format!("{}{}{}", &name[..dot], suffix, &name[dot..]),
            _ => format!("{name}{suffix}"),
        };
        match self.parent() {
            Some(dir) => Self(format!("{dir}/{archived_name}")),
            None => Self(archived_name),
        }
    }

    /// Check whether this key names an archive document
    #[must_use]
    pub fn is_archive(&self, suffix: &str) -> bool {
        let name = self.file_name();
        let stem = match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        };
        stem.ends_with(suffix) || name.ends_with(suffix)
    }
}

impl Display for DocKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DocKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocKey> for String {
    fn from(key: DocKey) -> Self {
        key.0
    }
}

impl AsRef<str> for DocKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors in key construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Empty key
    #[error("document key is empty")]
    Empty,

    /// Absolute or platform-specific path
    #[error("document key must be a relative '/'-separated path: '{0}'")]
    NotRelative(String),

    /// Empty segment (e.g. `a//b` or trailing slash)
    #[error("empty segment in document key '{0}'")]
    EmptySegment(String),

    /// `.` or `..` segment
    #[error("path traversal not allowed in document key '{0}'")]
    Traversal(String),

    /// Segment with forbidden characters
    #[error("invalid segment: '{0}'")]
    InvalidSegment(String),
}
