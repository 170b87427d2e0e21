//! Log Store File
//!
//! Low-level access to the main log and its two index files.
//!
//! ## Responsibilities
//! - Append record index entries and new logger names
//! - Bulk replay of both indexes (read-up-to-current-length)
//! - Truncate and backup all three artifacts together
//! - Deliver lifecycle events to registered hooks

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::ops::Range;
use std::path::Path;

use parking_lot::Mutex;

use crate::codec::{decode_index_entries, decode_logger_names, encode_index_entry, encode_logger_name};
use crate::error::Result;
use crate::model::LogRecord;

use super::lifecycle::{HookId, LifecycleEvent, LifecycleHook, LifecycleHooks};
use super::StorePaths;

/// The three artifacts of one log
///
/// ## Concurrency:
/// - Index appends are serialized by the `index` mutex, and in practice by
///   the Writer's critical section above it
/// - Replay readers open their own handles and never take the mutex
/// - All methods use `&self`
pub struct LogStoreFile {
    paths: StorePaths,

    /// Append handles and the names already present in the logger index
    index: Mutex<IndexState>,

    /// Erase/backup listeners
    hooks: LifecycleHooks,
}

#[derive(Default)]
struct IndexState {
    record_index: Option<File>,
    logger_index: Option<File>,
    /// Loaded from disk on first append
    known_loggers: Option<Vec<String>>,
}

impl IndexState {
    fn close(&mut self) {
        self.record_index = None;
        self.logger_index = None;
        self.known_loggers = None;
    }
}

impl LogStoreFile {
    /// Open the store rooted at `log_path`
    ///
    /// Creates the parent directory if needed; the artifacts themselves are
    /// created lazily by the first write.
    pub fn open(log_path: &Path) -> Result<Self> {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            paths: StorePaths::new(log_path),
            index: Mutex::new(IndexState::default()),
            hooks: LifecycleHooks::default(),
        })
    }

    /// Paths of all artifacts
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Path of the main record log
    pub fn log_path(&self) -> &Path {
        &self.paths.log
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Append one record index entry, registering `logger_name` if the index
    /// has not seen it yet. Returns the record as persisted.
    pub fn append(
        &self,
        logger_name: &str,
        timestamp_millis: i64,
        severity: i32,
        body: Range<u64>,
    ) -> Result<LogRecord> {
        let mut guard = self.index.lock();
        let state = &mut *guard;

        let logger_id = self.logger_id(state, logger_name)?;
        let record = LogRecord {
            logger_id,
            timestamp_millis,
            severity,
            body_start: body.start,
            body_end: body.end,
        };

        let entry = encode_index_entry(&record)?;
        let file = append_handle(&mut state.record_index, &self.paths.record_index)?;
        let start_len = file.metadata()?.len();
        if let Err(e) = file.write_all(&entry) {
            // A partial entry would shift every later one
            if let Err(trim) = file.set_len(start_len) {
                tracing::error!(
                    "Failed to trim {}: {}",
                    self.paths.record_index.display(),
                    trim
                );
            }
            state.record_index = None;
            return Err(e.into());
        }

        Ok(record)
    }

    /// Id of `logger_name` in the logger index, appending it when new
    fn logger_id(&self, state: &mut IndexState, logger_name: &str) -> Result<u32> {
        if state.known_loggers.is_none() {
            state.known_loggers = Some(read_logger_names(&self.paths.logger_index)?);
        }
        let known = state.known_loggers.get_or_insert_with(Vec::new);

        // Linear scan; logger cardinality is small
        if let Some(pos) = known.iter().position(|name| name == logger_name) {
            return Ok(pos as u32);
        }

        let encoded = encode_logger_name(logger_name);
        append_handle(&mut state.logger_index, &self.paths.logger_index)?.write_all(&encoded)?;
        known.push(logger_name.to_string());

        tracing::debug!("New logger #{} in index: {}", known.len() - 1, logger_name);
        Ok((known.len() - 1) as u32)
    }

    /// Drop the append handles (next append reopens them)
    pub fn close(&self) {
        self.index.lock().close();
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// All logger names in first-seen order; empty when the index is absent
    pub fn read_all_logger_names(&self) -> Result<Vec<String>> {
        read_logger_names(&self.paths.logger_index)
    }

    /// All record index entries in write order; empty when the index is absent
    pub fn read_all_record_entries(&self) -> Result<Vec<LogRecord>> {
        match read_if_exists(&self.paths.record_index)? {
            Some(bytes) => decode_index_entries(&bytes),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Truncate / Backup
    // =========================================================================

    /// Empty all three artifacts, creating any that are missing
    pub fn truncate_all(&self) -> Result<()> {
        let mut state = self.index.lock();
        state.close();

        for path in self.paths.all() {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
        }

        tracing::info!("Truncated log store {}", self.paths.log.display());
        Ok(())
    }

    /// Move all artifacts to their `~` siblings, replacing older backups
    ///
    /// Returns true when none of the original paths exist afterwards.
    pub fn backup(&self) -> Result<bool> {
        let mut state = self.index.lock();
        state.close();

        for path in self.paths.all() {
            let backup = StorePaths::backup_of(path);
            if backup.exists() {
                fs::remove_file(&backup)?;
            }
            if path.exists() {
                fs::rename(path, &backup)?;
            }
        }

        let moved = self.paths.all().iter().all(|path| !path.exists());
        tracing::info!(
            "Backed up log store {} (moved={})",
            self.paths.log.display(),
            moved
        );
        Ok(moved)
    }

    /// True when any artifact holds data
    pub fn needs_backup(&self) -> bool {
        self.paths
            .all()
            .iter()
            .any(|path| fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false))
    }

    /// False when an existing artifact, or the directory holding them, is read-only
    pub fn is_writable(&self) -> bool {
        let dir_writable = self
            .paths
            .log
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| match fs::metadata(p) {
                Ok(m) => !m.permissions().readonly(),
                Err(_) => false,
            })
            .unwrap_or(true);

        dir_writable
            && self.paths.all().iter().all(|path| match fs::metadata(path) {
                Ok(m) => !m.permissions().readonly(),
                Err(e) => e.kind() == ErrorKind::NotFound,
            })
    }

    /// Current size of the main log, 0 when absent
    pub fn main_len(&self) -> u64 {
        fs::metadata(&self.paths.log).map(|m| m.len()).unwrap_or(0)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register a hook for erase/backup transitions
    pub fn add_lifecycle_hook(&self, hook: LifecycleHook) -> HookId {
        self.hooks.add(hook)
    }

    pub fn remove_lifecycle_hook(&self, id: HookId) {
        self.hooks.remove(id);
    }

    pub(crate) fn fire(&self, event: LifecycleEvent) {
        self.hooks.fire(event);
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn append_handle<'a>(slot: &'a mut Option<File>, path: &Path) -> Result<&'a mut File> {
    let file = match slot.take() {
        Some(file) => file,
        None => OpenOptions::new().create(true).append(true).open(path)?,
    };
    Ok(slot.insert(file))
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_logger_names(path: &Path) -> Result<Vec<String>> {
    Ok(read_if_exists(path)?
        .map(|bytes| decode_logger_names(&bytes))
        .unwrap_or_default())
}
