//! Engine Module
//!
//! Wires one store, its writer, and its views together.
//!
//! ## Responsibilities
//! - Open the store from a `Config`
//! - Own the single writer for the store
//! - Start the tail engine and layer the filter engine over it
//! - Shut everything down in dependency order

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::model::LogRecord;
use crate::store::{LogStoreFile, Writer};
use crate::view::{FilterEngine, FilterState, TailEngine};

/// A log store with its writer and live views
///
/// ## Ownership
/// - `store`: shared by the writer, the tail engine and its message cache
/// - `tail`: shared with the filter engine, which reads its list
/// - `filter`: exclusively owned
///
/// Erase goes through the writer; the tail engine hears about it through the
/// store's lifecycle hooks and the filter engine through the tail's events.
pub struct LogEngine {
    /// Engine configuration
    config: Config,

    /// On-disk artifacts
    store: Arc<LogStoreFile>,

    /// Single writer for the store
    writer: Writer,

    /// Full live view
    tail: Arc<TailEngine>,

    /// Filtered live view
    filter: FilterEngine,
}

impl LogEngine {
    /// Open or create a log store with the given config
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Open the store (parent directory created if needed)
    /// 3. Create the writer and both views
    /// 4. Start tailing when `autostart` is set
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(LogStoreFile::open(&config.log_path)?);
        let writer = Writer::new(Arc::clone(&store));
        let tail = Arc::new(TailEngine::new(Arc::clone(&store), &config));
        let filter = FilterEngine::new(Arc::clone(&tail), &config);

        if config.autostart {
            tail.start()?;
        }

        tracing::debug!(
            "Opened log engine at {} (page_size={})",
            config.log_path.display(),
            config.page_size
        );

        Ok(Self {
            config,
            store,
            writer,
            tail,
            filter,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified log path
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().log_path(path).build())
    }

    /// Append one record; failures are logged, not returned
    pub fn publish(&self, severity: i32, timestamp_millis: i64, logger_name: &str, message: &str) {
        self.writer.publish(severity, timestamp_millis, logger_name, message);
    }

    /// Append one record stamped with the current time
    pub fn publish_now(&self, severity: i32, logger_name: &str, message: &str) {
        self.writer.publish_now(severity, logger_name, message);
    }

    /// Append one record, surfacing failures
    pub fn write(&self, severity: i32, timestamp_millis: i64, logger_name: &str, message: &str) -> Result<LogRecord> {
        self.writer.write(severity, timestamp_millis, logger_name, message)
    }

    /// Truncate the store; both views are reset and tailing restarts
    pub fn erase(&self) -> Result<()> {
        self.writer.erase_log_file()
    }

    /// Move the store to its backup siblings
    pub fn backup(&self) -> Result<bool> {
        self.writer.backup_log_file()
    }

    /// Install a filter predicate on the filtered view
    pub fn apply_filter(&self, state: FilterState) -> Result<()> {
        self.filter.apply(state)
    }

    /// Message body of a record
    pub fn message(&self, record: &LogRecord) -> String {
        self.tail.message(record)
    }

    /// Close the engine gracefully
    ///
    /// Stops both workers, then closes the writer session
    pub fn close(self) -> Result<()> {
        self.filter.stop();
        self.tail.stop();
        self.writer.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<LogStoreFile> {
        &self.store
    }

    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    pub fn tail(&self) -> &Arc<TailEngine> {
        &self.tail
    }

    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }
}
