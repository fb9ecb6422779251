//! docsync Document Cache
//!
//! In-memory, versioned documents kept consistent with their backing files
//! under concurrent readers, writers and archival.
//!
//! # Core Operations
//!
//! - **Get**: Consistent snapshot, lazily loaded and reloaded on staleness
//! - **Apply**: Optimistic, version-checked mutation of the in-memory copy
//! - **Flush**: Ordered, per-key exclusive persist with merge on external change
//! - **Flush linked**: Primary and archive document as one logical write
//!
//! # Architecture
//!
//! ```text
//! Consumer → DocumentCache → SyncEngine → FileAdapter → Document Store
//!               (apply)        (merge)       (atomic write)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use docsync_cache::{CacheConfig, DocumentCache};
//! use docsync_model::{DocKey, Mutation, Stamp};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = DocumentCache::open("./notes", CacheConfig::default());
//! let key = DocKey::new("tasks/today.md")?;
//!
//! let doc = cache.get(&key).await?;
//! cache
//!     .apply(&key, Mutation::Complete { line: 0, at: Stamp::today() }, doc.version())
//!     .await?;
//! cache.flush(&key).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod flush;
pub mod merge;
pub mod sync;

pub use cache::{CacheStats, DocumentCache, FlushReport};
pub use config::CacheConfig;
pub use error::CacheError;
pub use flush::{FlushHandle, FlushPhase};
pub use merge::{merge, MergeOutcome};
pub use sync::SyncEngine;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the Document Cache
    pub use crate::cache::{DocumentCache, FlushReport};
    pub use crate::config::CacheConfig;
    pub use crate::error::CacheError;
    pub use crate::flush::FlushHandle;
    pub use docsync_model::{DocKey, Document, LineStatus, Mutation, Stamp};
}
