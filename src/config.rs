//! Configuration for harnesslog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LogError, Result};

/// Default number of records per page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default interval between tail/filter polls (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300;

/// Main configuration for a log store and its views
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the main record log.
    /// Sibling artifacts are derived from it:
    ///   {log_path}              (framed records)
    ///   {log_path}.rec.index    (fixed-width record index)
    ///   {log_path}.log.index    (logger names, first-seen order)
    pub log_path: PathBuf,

    // -------------------------------------------------------------------------
    // View Configuration
    // -------------------------------------------------------------------------
    /// Records per page; page notifications fire on multiples of this
    pub page_size: usize,

    /// How long a caught-up worker sleeps before polling again (milliseconds)
    pub poll_interval_ms: u64,

    /// Message cache capacity; `None` means twice the page size
    pub cache_capacity: Option<usize>,

    /// Start the tail engine as soon as the engine facade is opened
    pub autostart: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("./harness.log"),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            cache_capacity: None,
            autostart: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Effective message cache capacity
    pub fn effective_cache_capacity(&self) -> usize {
        self.cache_capacity.unwrap_or(self.page_size * 2)
    }

    /// Reject values the views cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(LogError::Config("page_size must be positive".to_string()));
        }
        if self.effective_cache_capacity() == 0 {
            return Err(LogError::Config(
                "cache_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the main log path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    /// Set the page size
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the poll interval (in milliseconds)
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the message cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = Some(capacity);
        self
    }

    /// Whether the engine facade starts tailing on open
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.config.autostart = autostart;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
