//! Writer
//!
//! Appends records to a store. All operations share one critical section, so
//! no reader ever observes a partial record or a partial index entry.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::codec::{encode_frame, sanitize_logger_name, SESSION_END, SIGNATURE};
use crate::error::{LogError, Result};
use crate::model::LogRecord;

use super::lifecycle::LifecycleEvent;
use super::LogStoreFile;

/// Single writer for one store
///
/// ## Concurrency
/// - `session` is the critical section for publish, close, backup and erase
/// - Lifecycle hooks run on the erasing thread while the section is held, so
///   a hook (or a view listener it triggers) must not call back into `write`
pub struct Writer {
    store: Arc<LogStoreFile>,
    session: Mutex<Session>,
}

#[derive(Default)]
struct Session {
    /// Append handle on the main log
    main: Option<File>,
    /// Whether this session appended anything (gates the end marker)
    wrote: bool,
}

impl Session {
    fn main_handle(&mut self, store: &LogStoreFile) -> Result<&mut File> {
        let file = match self.main.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(store.log_path())?,
        };
        Ok(self.main.insert(file))
    }

    fn reset(&mut self) {
        self.main = None;
        self.wrote = false;
    }
}

impl Writer {
    pub fn new(store: Arc<LogStoreFile>) -> Self {
        Self {
            store,
            session: Mutex::new(Session::default()),
        }
    }

    /// The store this writer appends to
    pub fn store(&self) -> &Arc<LogStoreFile> {
        &self.store
    }

    /// Append one record and its index entry
    ///
    /// Steps:
    /// 1. Acquire the critical section
    /// 2. Emit the signature if the main log is empty
    /// 3. Write the encoded frame in one call
    /// 4. Append the index entry with the frame's body offsets
    ///
    /// On failure the main log is cut back to its length before step 2, so
    /// it never holds a record the index lacks.
    pub fn write(
        &self,
        severity: i32,
        timestamp_millis: i64,
        logger_name: &str,
        message: &str,
    ) -> Result<LogRecord> {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        let logger_name = sanitize_logger_name(logger_name);
        let file = session.main_handle(&self.store)?;
        let start_len = file.metadata()?.len();

        let result = self.append_record(
            file,
            start_len,
            &logger_name,
            severity,
            timestamp_millis,
            message,
        );
        match result {
            Ok(record) => {
                session.wrote = true;
                Ok(record)
            }
            Err(e) => {
                self.roll_back(session, start_len);
                Err(e)
            }
        }
    }

    fn append_record(
        &self,
        file: &mut File,
        start_len: u64,
        logger_name: &str,
        severity: i32,
        timestamp_millis: i64,
        message: &str,
    ) -> Result<LogRecord> {
        let mut offset = start_len;
        if offset == 0 {
            file.write_all(SIGNATURE)?;
            offset = SIGNATURE.len() as u64;
        }

        let frame = encode_frame(logger_name, severity, timestamp_millis, message);
        file.write_all(&frame.bytes)?;
        file.flush()?;

        let body_start = offset + frame.body_offset;
        self.store.append(
            logger_name,
            timestamp_millis,
            severity,
            body_start..body_start + frame.body_len,
        )
    }

    /// Cut the main log back to `len` and drop the handle so the next write reopens it
    fn roll_back(&self, session: &mut Session, len: u64) {
        if let Some(file) = session.main.take() {
            if let Err(e) = file.set_len(len) {
                tracing::error!(
                    "Failed to roll back {} to {} bytes: {}",
                    self.store.log_path().display(),
                    len,
                    e
                );
            }
        }
    }

    /// Producer entry point: failures are logged, never returned
    pub fn publish(&self, severity: i32, timestamp_millis: i64, logger_name: &str, message: &str) {
        if let Err(e) = self.write(severity, timestamp_millis, logger_name, message) {
            tracing::error!("Failed to publish record from {}: {}", logger_name, e);
        }
    }

    /// Publish stamped with the current wall clock
    pub fn publish_now(&self, severity: i32, logger_name: &str, message: &str) {
        self.publish(severity, now_millis(), logger_name, message);
    }

    /// Flush, write the session-end marker, and release handles
    ///
    /// A later `write` reopens the files and continues the same log.
    pub fn close(&self) -> Result<()> {
        let mut session = self.session.lock();

        if let Some(mut file) = session.main.take() {
            if session.wrote {
                file.write_all(SESSION_END)?;
            }
            file.flush()?;
            file.sync_all()?;
        }
        session.reset();
        self.store.close();

        Ok(())
    }

    /// Truncate all artifacts, bracketed by lifecycle events
    ///
    /// Fails with `Permission` and leaves the store untouched when it is not
    /// writable. `Erased` fires even if truncation fails, so views restart.
    pub fn erase_log_file(&self) -> Result<()> {
        let mut session = self.session.lock();

        if !self.store.is_writable() {
            return Err(LogError::Permission(format!(
                "log store {} is not writable",
                self.store.log_path().display()
            )));
        }

        tracing::info!("Erasing log store {}", self.store.log_path().display());
        self.store.fire(LifecycleEvent::StartErasing);

        session.reset();
        let result = self.store.truncate_all();

        self.store.fire(LifecycleEvent::Erased);
        result
    }

    /// Move the artifacts to their backup siblings, bracketed by lifecycle events
    ///
    /// Returns true when the original paths are gone afterwards.
    pub fn backup_log_file(&self) -> Result<bool> {
        let mut session = self.session.lock();

        self.store.fire(LifecycleEvent::StartErasing);

        session.reset();
        let result = self.store.backup();

        self.store.fire(LifecycleEvent::Erased);
        result
    }
}

/// Milliseconds since the Unix epoch, 0 if the clock is before it
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
