//! Content hashing for raw document text
//!
//! [`ContentHash`] is the Blake3 digest of a backing file's bytes. The sync
//! engine records it at load and flush time so that an external rewrite
//! inside the same mtime tick is still detected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Blake3 digest of a file's text, rendered as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Digest of raw bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest of a document's raw text
    #[inline]
    #[must_use]
    pub fn of_text(text: &str) -> Self {
        Self::compute(text.as_bytes())
    }

    /// First 8 bytes in hex, for log fields
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        <[u8; 32]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| HashError::Length(bytes.len()))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Malformed hex digest
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Decoded to the wrong number of bytes
    #[error("content hash must be 32 bytes, got {0}")]
    Length(usize),

    /// Not hex
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_newline_changes_the_hash() {
        assert_eq!(ContentHash::of_text("- [ ] a\n"), ContentHash::of_text("- [ ] a\n"));
        assert_ne!(ContentHash::of_text("- [ ] a"), ContentHash::of_text("- [ ] a\n"));
    }

    #[test]
    fn hex_form_parses_back() {
        let hash = ContentHash::of_text("today");
        assert_eq!(hash.to_string().parse::<ContentHash>().unwrap(), hash);
        assert!(hash.to_string().starts_with(&hash.short()));
        assert!(matches!("abcd".parse::<ContentHash>(), Err(HashError::Length(2))));
        assert!(matches!("zz".parse::<ContentHash>(), Err(HashError::Hex(_))));
    }

    #[test]
    fn serializes_as_hex_string() {
        let hash = ContentHash::of_text("today");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        assert_eq!(serde_json::from_str::<ContentHash>(&json).unwrap(), hash);
    }
}
