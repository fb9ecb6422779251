//! Configuration file for the `docsync` binary
//!
//! ```toml
//! root = "/home/me/notes"
//!
//! [cache]
//! archive_suffix = ".done"
//! lock_timeout = 2000
//!
//! [trigger]
//! scan_interval = 30
//! keys = ["tasks/today.md"]
//! ```

use anyhow::Context;
use docsync_cache::CacheConfig;
use docsync_trigger::TriggerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level `docsync` configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsyncConfig {
    /// Directory documents are resolved against
    pub root: PathBuf,
    /// Document cache settings
    pub cache: CacheConfig,
    /// Archival trigger settings
    pub trigger: TriggerConfig,
}

impl DocsyncConfig {
    /// Read a TOML configuration file
    ///
    /// A relative `root` is taken relative to the file's directory.
    ///
    /// # Errors
    /// Fails if the file cannot be read or is not valid configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        if config.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.root = dir.join(&config.root);
            }
        }
        Ok(config)
    }

    /// With document root
    #[inline]
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

impl Default for DocsyncConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            cache: CacheConfig::default(),
            trigger: TriggerConfig::default(),
        }
    }
}
