//! docsync Data Model
//!
//! Typed, versioned task documents with semantic mutations.
//!
//! # Core Concepts
//!
//! - [`DocKey`]: Relative path naming one backing file in a store
//! - [`Document`]: Parsed content plus version and sync metadata
//! - [`Entry`]: A task ([`LineRecord`]) or a verbatim passthrough line
//! - [`LineStatus`]: `Pending < Completed < Archived`, archived is terminal
//! - [`Mutation`]: Atomic edit validated against the current body
//! - [`ContentHash`]: Blake3 digest of a backing file's bytes
//!
//! # Example
//!
//! ```rust
//! use docsync_model::{DocKey, Document, Mutation, Stamp};
//!
//! let key = DocKey::new("today.md").unwrap();
//! let doc = Document::created(key)
//!     .commit(&Mutation::AppendTask { text: "buy milk".into() })
//!     .unwrap();
//! let doc = doc
//!     .commit(&Mutation::Complete { line: 0, at: Stamp::today() })
//!     .unwrap();
//! assert_eq!(doc.version(), 2);
//! assert_eq!(doc.completed_lines(), vec![0]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod document;
mod hash;
mod key;
mod line;
mod mutation;

pub use document::Document;
pub use hash::{ContentHash, HashError};
pub use key::{DocKey, KeyError};
pub use line::{Body, Entry, LineRecord, LineStatus, Stamp, StampError};
pub use mutation::{Mutation, MutationError, ARCHIVED_MARKER};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
