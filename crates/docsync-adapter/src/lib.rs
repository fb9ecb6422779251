//! docsync File Adapter
//!
//! The boundary between backing files and parsed document bodies. Every
//! read and write of the Document Store goes through this crate.
//!
//! # Core Operations
//!
//! - **Load**: Read a file, hash it, parse it into a [`docsync_model::Body`]
//! - **Render**: Serialize a body back to the line-oriented task format
//! - **Persist**: Atomically replace one or more files (temp + rename)
//! - **Lock**: Cross-instance exclusion through `.<file>.lock` siblings
//!
//! # Architecture
//!
//! ```text
//! File System → FileStore → TaskListFormat → Body → TaskListFormat → FileStore → File System
//!                               ↑___________↓
//!                         ParseCache (content-addressed)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use docsync_adapter::{FileAdapter, FileStore};
//! use docsync_model::DocKey;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = FileAdapter::new(Arc::new(FileStore::new("./notes")));
//! let key = DocKey::new("tasks/today.md")?;
//!
//! if let Some(snapshot) = adapter.load(&key).await? {
//!     adapter.persist(&[(key, &snapshot.body)]).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod adapter;
pub mod error;
pub mod format;
pub mod lock;
pub mod parse_cache;
pub mod store;

pub use adapter::{DiskSnapshot, FileAdapter, Persisted};
pub use error::{AdapterError, ParseError, StoreError};
pub use format::{DocumentFormat, TaskListFormat};
pub use lock::{LockOptions, StoreLock};
pub use parse_cache::{ParseCache, ParseCacheStats};
pub use store::{DocumentStore, FileStore, PendingWrite, RawFile};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the File Adapter
    pub use crate::adapter::{DiskSnapshot, FileAdapter};
    pub use crate::error::{AdapterError, ParseError, StoreError};
    pub use crate::format::{DocumentFormat, TaskListFormat};
    pub use crate::store::{DocumentStore, FileStore};
    pub use docsync_model::{Body, ContentHash, DocKey, Entry, LineRecord, LineStatus};
}
