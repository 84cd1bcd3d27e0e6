//! Module load-time configuration.
//!
//! Parsed from RON, e.g.:
//!
//! ```ron
//! (
//!     total_capacity: 4,
//!     max_entries_per_dir: Some(1),
//!     name_max: 32,
//!     max_pages: Some(1024),
//! )
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::page::system_page_size;

/// Default number of mounts the quota pool admits.
pub const DEFAULT_TOTAL_CAPACITY: usize = 1;

/// Default maximum file name length, in bytes.
pub const DEFAULT_NAME_MAX: usize = 32;

/// Default permission bits of a namespace root.
pub const DEFAULT_MODE: u32 = 0o755;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration fixed when the module is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Size of the quota pool: how many mounts may ever reserve a unit.
    pub total_capacity: usize,
    /// Per-directory file cap. `None` seeds it from `total_capacity`.
    pub max_entries_per_dir: Option<usize>,
    /// Maximum file name length, in bytes.
    pub name_max: usize,
    /// Page size. `None` uses the host page size.
    pub page_size: Option<usize>,
    /// Module-wide cap on live pages. `None` is unbounded.
    pub max_pages: Option<usize>,
    /// Permission bits of each namespace root.
    pub default_mode: u32,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            total_capacity: DEFAULT_TOTAL_CAPACITY,
            max_entries_per_dir: None,
            name_max: DEFAULT_NAME_MAX,
            page_size: None,
            max_pages: None,
            default_mode: DEFAULT_MODE,
        }
    }
}

impl FsConfig {
    /// Parse a configuration from RON text and validate it.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: FsConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a `.ron` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&text)
    }

    /// Set the quota pool size.
    pub fn with_total_capacity(mut self, total_capacity: usize) -> Self {
        self.total_capacity = total_capacity;
        self
    }

    /// Set an explicit per-directory cap.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries_per_dir = Some(max_entries);
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Set the module-wide page budget.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Effective page size.
    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or_else(system_page_size)
    }

    /// Effective cap for a mount's root directory.
    pub fn max_entries(&self) -> usize {
        self.max_entries_per_dir.unwrap_or(self.total_capacity)
    }

    /// Check the configuration for values the module cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_capacity == 0 {
            return Err(ConfigError::Invalid("total_capacity must be at least 1".into()));
        }
        if self.max_entries_per_dir == Some(0) {
            return Err(ConfigError::Invalid(
                "max_entries_per_dir must be at least 1".into(),
            ));
        }
        if self.name_max == 0 {
            return Err(ConfigError::Invalid("name_max must be at least 1".into()));
        }
        if let Some(size) = self.page_size {
            if !size.is_power_of_two() {
                return Err(ConfigError::Invalid(format!(
                    "page_size {size} is not a power of two"
                )));
            }
        }
        Ok(())
    }
}
