//! Store Module
//!
//! Owns the three on-disk artifacts of one log and the single writer that
//! appends to them.
//!
//! ## Responsibilities
//! - Derive sibling index and backup paths from the main log path
//! - Append record index entries and first-seen logger names
//! - Bulk replay of both indexes for tail startup
//! - Truncate ("erase") and backup, announced through lifecycle hooks
//!
//! ## Layout
//! ```text
//!   {name}              framed records (see codec)
//!   {name}.rec.index    32-byte record index entries
//!   {name}.log.index    length-prefixed logger names
//!   {name}~ ...         most recent backup of each of the above
//! ```

mod file;
mod lifecycle;
mod writer;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub use file::LogStoreFile;
pub use lifecycle::{HookId, LifecycleEvent, LifecycleHook};
pub use writer::{now_millis, Writer};

/// Suffix of the record index file
pub const RECORD_INDEX_SUFFIX: &str = ".rec.index";

/// Suffix of the logger name index file
pub const LOGGER_INDEX_SUFFIX: &str = ".log.index";

/// Suffix marking a backup sibling
pub const BACKUP_SUFFIX: &str = "~";

/// Paths of the three artifacts belonging to one log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub log: PathBuf,
    pub record_index: PathBuf,
    pub logger_index: PathBuf,
}

impl StorePaths {
    pub fn new(log: impl Into<PathBuf>) -> Self {
        let log = log.into();
        Self {
            record_index: with_suffix(&log, RECORD_INDEX_SUFFIX),
            logger_index: with_suffix(&log, LOGGER_INDEX_SUFFIX),
            log,
        }
    }

    /// All three artifacts, main log first
    pub fn all(&self) -> [&Path; 3] {
        [&self.log, &self.record_index, &self.logger_index]
    }

    /// Backup sibling of one artifact
    pub fn backup_of(path: &Path) -> PathBuf {
        with_suffix(path, BACKUP_SUFFIX)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
