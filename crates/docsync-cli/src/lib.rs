//! docsync command line support
//!
//! Configuration loading and subcommand bodies for the `docsync` binary.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;
pub mod config;

pub use config::DocsyncConfig;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
