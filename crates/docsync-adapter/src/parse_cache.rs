//! Content-addressed parse cache using moka
//!
//! Maps the Blake3 hash of raw file text to its parsed [`Body`], so a
//! reload of unchanged bytes (or the archive file another key just wrote)
//! skips the parser.

use docsync_model::{Body, ContentHash};
use moka::future::Cache;
use std::sync::Arc;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseCacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Parsed bodies keyed by raw-content hash
#[derive(Debug, Clone)]
pub struct ParseCache {
    inner: Cache<ContentHash, Arc<Body>>,
}

impl ParseCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Insert parsed body
    #[inline]
    pub async fn insert(&self, hash: ContentHash, body: Arc<Body>) {
        self.inner.insert(hash, body).await;
    }

    /// Get parsed body
    #[inline]
    pub async fn get(&self, hash: &ContentHash) -> Option<Arc<Body>> {
        self.inner.get(hash).await
    }

    /// Try to get or parse
    ///
    /// # Errors
    /// Propagates the parser's error; failures are not cached.
    pub async fn try_get_or_parse<E, F>(&self, hash: ContentHash, parse: F) -> Result<Arc<Body>, E>
    where
        F: FnOnce() -> Result<Body, E>,
    {
        if let Some(cached) = self.get(&hash).await {
            tracing::trace!(hash = %hash.short(), "parse cache hit");
            return Ok(cached);
        }
        let body = Arc::new(parse()?);
        self.insert(hash, Arc::clone(&body)).await;
        Ok(body)
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Get cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> ParseCacheStats {
        ParseCacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

impl Default for ParseCache {
    /// Create cache with default capacity (1,024 entries)
    fn default() -> Self {
        Self::new(1_024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_model::{Entry, LineRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn body() -> Body {
        Body {
            entries: vec![Entry::Task(LineRecord::pending("buy milk"))],
            trailing_newline: true,
        }
    }

    #[tokio::test]
    async fn parse_runs_once_per_hash() {
        let cache = ParseCache::new(16);
        let hash = ContentHash::of_text("- [ ] buy milk\n");
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let parsed = cache
                .try_get_or_parse::<(), _>(hash, move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(body())
                })
                .await
                .unwrap();
            assert_eq!(*parsed, body());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parse_failures_are_not_cached() {
        let cache = ParseCache::new(16);
        let hash = ContentHash::of_text("- [?] bad");

        let first = cache.try_get_or_parse(hash, || Err::<Body, _>("bad")).await;
        assert!(first.is_err());
        assert!(cache.get(&hash).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_clears_entries() {
        let cache = ParseCache::default();
        let hash = ContentHash::of_text("x");
        cache.insert(hash, Arc::new(body())).await;
        assert!(cache.get(&hash).await.is_some());
        cache.invalidate_all();
        assert!(cache.get(&hash).await.is_none());
    }
}
