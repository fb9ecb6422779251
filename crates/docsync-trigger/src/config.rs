//! Trigger configuration

use docsync_model::DocKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Task completion trigger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Time between periodic scans
    #[serde(with = "duration_secs")]
    pub scan_interval: Duration,
    /// Re-scans allowed after a version conflict
    pub max_conflict_retries: u32,
    /// Documents the worker scans
    pub keys: Vec<DocKey>,
}

impl TriggerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With scan interval
    #[inline]
    #[must_use]
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// With conflict retry budget
    #[inline]
    #[must_use]
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// With scanned keys
    #[inline]
    #[must_use]
    pub fn with_keys(mut self, keys: Vec<DocKey>) -> Self {
        self.keys = keys;
        self
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            max_conflict_retries: 3,
            keys: Vec::new(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
