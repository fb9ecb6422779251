//! docsync Task Completion Trigger
//!
//! Scans documents for completed tasks and archives them. The trigger is a
//! cache consumer like any other: it depends on `docsync-cache` and never
//! on the store, so bypassing the single consistency point is not
//! expressible.
//!
//! - [`TaskCompletionTrigger::run_once`]: one archival pass over one key
//! - [`TriggerWorker`]: periodic passes over a key set, with pause/resume

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod trigger;
pub mod worker;

pub use config::TriggerConfig;
pub use error::TriggerError;
pub use trigger::{ArchiveOutcome, TaskCompletionTrigger};
pub use worker::{TriggerCommand, TriggerWorker, WorkerReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running archival passes
    pub use crate::config::TriggerConfig;
    pub use crate::error::TriggerError;
    pub use crate::trigger::{ArchiveOutcome, TaskCompletionTrigger};
    pub use crate::worker::{TriggerCommand, TriggerWorker, WorkerReport};
}
