//! Cache configuration

use docsync_adapter::lock::duration_millis;
use docsync_adapter::LockOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Document cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Inserted before the extension to name archive documents
    pub archive_suffix: String,
    /// Parsed bodies kept in the content-addressed parse cache
    pub parse_cache_capacity: u64,
    /// Lock files older than this are taken over
    #[serde(with = "duration_millis")]
    pub lock_stale_after: Duration,
    /// Delay between lock acquisition attempts
    #[serde(with = "duration_millis")]
    pub lock_retry_interval: Duration,
    /// Give up acquiring a store lock after this long
    #[serde(with = "duration_millis")]
    pub lock_timeout: Duration,
}

impl CacheConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With archive suffix
    #[inline]
    #[must_use]
    pub fn with_archive_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.archive_suffix = suffix.into();
        self
    }

    /// With parse cache capacity
    #[inline]
    #[must_use]
    pub fn with_parse_cache_capacity(mut self, capacity: u64) -> Self {
        self.parse_cache_capacity = capacity;
        self
    }

    /// With lock timeout
    #[inline]
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// With stale lock age
    #[inline]
    #[must_use]
    pub fn with_lock_stale_after(mut self, age: Duration) -> Self {
        self.lock_stale_after = age;
        self
    }

    /// Lock settings for a [`docsync_adapter::FileStore`]
    #[must_use]
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            stale_after: self.lock_stale_after,
            retry_interval: self.lock_retry_interval,
            timeout: self.lock_timeout,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let lock = LockOptions::default();
        Self {
            archive_suffix: ".archive".to_string(),
            parse_cache_capacity: 1_024,
            lock_stale_after: lock.stale_after,
            lock_retry_interval: lock.retry_interval,
            lock_timeout: lock.timeout,
        }
    }
}
