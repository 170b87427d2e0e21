//! Tailing Engine
//!
//! Replays the persisted index on start, then follows the main log as it
//! grows, keeping an in-memory record list in file order.
//!
//! ## States
//! ```text
//!   Idle ──start()──▶ Replaying ──▶ Tailing ──stop()/error──▶ Stopped
//!                        ▲              │
//!                        └── shrink ────┘
//! ```

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::codec::{check_signature, decode_frame, Decoded, DecodedFrame, SIGNATURE};
use crate::config::Config;
use crate::error::{LogError, Result};
use crate::model::{level, LogRecord};
use crate::store::{HookId, LifecycleEvent, LogStoreFile};

use super::cache::MessageCache;
use super::events::{Listener, Listeners, Pager, ViewEvent};
use super::worker::{CancelToken, Worker};

/// Lifecycle of the tail worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Idle,
    Replaying,
    Tailing,
    Stopped,
}

/// Live view over every record of one store
pub struct TailEngine {
    shared: Arc<TailShared>,
    hook: HookId,
}

pub(crate) struct TailShared {
    store: Arc<LogStoreFile>,
    page_size: usize,
    poll_interval: Duration,

    /// Written only by the worker (or by reset while the worker is stopped)
    records: RwLock<Vec<LogRecord>>,
    loggers: RwLock<Vec<String>>,

    cache: Mutex<MessageCache>,
    state: Mutex<TailState>,
    /// Last poll found no new bytes
    stable: AtomicBool,
    listeners: Listeners,
    worker: Mutex<Option<Worker>>,
}

/// How one replay-and-tail run ended
enum RunEnd {
    Cancelled,
    /// The main log shrank under us; replay from scratch
    Restart,
}

/// Result of one poll of the main log
enum Poll {
    Progress,
    Idle,
    Shrunk,
}

/// Read position in the main log
struct Cursor {
    file: Option<File>,
    offset: u64,
    verified: bool,
    /// File length at which the frame at `offset` last failed to decode
    stalled_at: Option<u64>,
}

impl TailEngine {
    /// Create an engine over `store`. Does not start the worker.
    ///
    /// The engine follows the store's erase lifecycle: `StartErasing` resets
    /// it synchronously, `Erased` starts it again.
    pub fn new(store: Arc<LogStoreFile>, config: &Config) -> Self {
        let shared = Arc::new(TailShared {
            cache: Mutex::new(MessageCache::new(
                store.log_path(),
                config.effective_cache_capacity(),
            )),
            store: Arc::clone(&store),
            page_size: config.page_size.max(1),
            poll_interval: config.poll_interval(),
            records: RwLock::new(Vec::new()),
            loggers: RwLock::new(Vec::new()),
            state: Mutex::new(TailState::Idle),
            stable: AtomicBool::new(false),
            listeners: Listeners::default(),
            worker: Mutex::new(None),
        });

        let weak: Weak<TailShared> = Arc::downgrade(&shared);
        let hook = store.add_lifecycle_hook(Arc::new(move |event: LifecycleEvent| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match event {
                LifecycleEvent::StartErasing => shared.reset(),
                LifecycleEvent::Erased => {
                    if let Err(e) = shared.start() {
                        tracing::error!("Failed to restart tail after erase: {}", e);
                    }
                }
            }
        }));

        Self { shared, hook }
    }

    /// Spawn the worker; no-op while it is running
    pub fn start(&self) -> Result<()> {
        self.shared.start()
    }

    /// Stop the worker and wait for it. No event fires after this returns.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Stop, then drop all records, loggers and cached messages
    pub fn reset(&self) {
        self.shared.reset();
    }

    pub fn add_listener(&self, listener: Listener) {
        self.shared.listeners.add(listener);
    }

    pub fn state(&self) -> TailState {
        *self.shared.state.lock()
    }

    /// Caught up with the end of the main log
    pub fn is_stable(&self) -> bool {
        self.shared.stable.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &Arc<LogStoreFile> {
        &self.shared.store
    }

    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }

    // =========================================================================
    // Record Access
    // =========================================================================

    pub fn len(&self) -> usize {
        self.shared.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<LogRecord> {
        self.shared.records.read().get(index).copied()
    }

    /// Records in `range`, clamped to the current length
    pub fn records(&self, range: Range<usize>) -> Vec<LogRecord> {
        let records = self.shared.records.read();
        let end = range.end.min(records.len());
        let start = range.start.min(end);
        records[start..end].to_vec()
    }

    /// Copy of the whole list
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.shared.records.read().clone()
    }

    pub fn logger_name(&self, logger_id: u32) -> Option<String> {
        self.shared.loggers.read().get(logger_id as usize).cloned()
    }

    pub fn loggers(&self) -> Vec<String> {
        self.shared.loggers.read().clone()
    }

    /// Message body of `record`, via the cache
    pub fn message(&self, record: &LogRecord) -> String {
        self.shared.cache.lock().get(record).to_string()
    }

    /// One-line header: timestamp, level name, logger
    pub fn render_header(&self, record: &LogRecord) -> String {
        let logger = self.logger_name(record.logger_id).unwrap_or_default();
        format!(
            "{} {} {}",
            record.timestamp_millis,
            level::name(record.severity),
            logger
        )
    }

    /// Number of message reads that reached the file
    pub fn cache_read_count(&self) -> u64 {
        self.shared.cache.lock().read_count()
    }
}

impl Drop for TailEngine {
    fn drop(&mut self) {
        self.shared.store.remove_lifecycle_hook(self.hook);
        self.shared.stop();
    }
}

impl TailShared {
    fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.worker.lock();
        if slot.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        *self.state.lock() = TailState::Idle;
        self.stable.store(false, Ordering::Release);

        let shared = Arc::clone(self);
        *slot = Some(Worker::spawn("harnesslog-tail", move |token| {
            shared.run(&token)
        })?);
        Ok(())
    }

    fn stop(&self) {
        // Release the slot before joining
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop();
        }
        *self.state.lock() = TailState::Stopped;
    }

    fn reset(&self) {
        self.stop();
        self.clear();
        self.listeners.emit(&ViewEvent::RemoveAllLoggers);
    }

    /// Drop in-memory state; returns whether anything was held
    fn clear(&self) -> bool {
        let mut records = self.records.write();
        let mut loggers = self.loggers.write();
        let had_data = !records.is_empty() || !loggers.is_empty();
        records.clear();
        loggers.clear();
        drop(loggers);
        drop(records);

        self.cache.lock().clear();
        self.stable.store(false, Ordering::Release);
        had_data
    }

    // =========================================================================
    // Worker Body
    // =========================================================================

    fn run(&self, token: &CancelToken) {
        loop {
            match self.replay_and_tail(token) {
                Ok(RunEnd::Cancelled) => break,
                Ok(RunEnd::Restart) => {
                    if !token.sleep(self.poll_interval) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "Tail of {} stopped: {}",
                        self.store.log_path().display(),
                        e
                    );
                    break;
                }
            }
        }
        *self.state.lock() = TailState::Stopped;
    }

    fn replay_and_tail(&self, token: &CancelToken) -> Result<RunEnd> {
        *self.state.lock() = TailState::Replaying;
        if self.clear() {
            self.listeners.emit(&ViewEvent::RemoveAllLoggers);
        }

        let mut pager = Pager::new(self.page_size);
        let resume = match self.replay(token, &mut pager)? {
            Some(resume) => resume,
            None => return Ok(RunEnd::Cancelled),
        };

        *self.state.lock() = TailState::Tailing;
        tracing::debug!(
            "Tailing {} from offset {} ({} replayed)",
            self.store.log_path().display(),
            resume,
            self.records.read().len()
        );

        let mut cursor = Cursor {
            file: None,
            offset: resume,
            verified: false,
            stalled_at: None,
        };

        loop {
            if token.is_cancelled() {
                return Ok(RunEnd::Cancelled);
            }

            match self.poll(&mut cursor, &mut pager, token) {
                Ok(Poll::Progress) => continue,
                Ok(Poll::Idle) => {}
                Err(LogError::NotReady) => {
                    tracing::trace!("{} not ready", self.store.log_path().display());
                    cursor.file = None;
                }
                Ok(Poll::Shrunk) => {
                    tracing::warn!(
                        "{} shrank below offset {}; replaying",
                        self.store.log_path().display(),
                        cursor.offset
                    );
                    return Ok(RunEnd::Restart);
                }
                Err(e) => return Err(e),
            }

            self.stable.store(true, Ordering::Release);
            let len = self.records.read().len();
            if let Some(event) = pager.on_stable(len) {
                self.listeners.emit(&event);
            }

            if !token.sleep(self.poll_interval) {
                return Ok(RunEnd::Cancelled);
            }
        }
    }

    /// Load persisted loggers and records. Returns the main-log offset to
    /// resume from, or None when cancelled.
    fn replay(&self, token: &CancelToken, pager: &mut Pager) -> Result<Option<u64>> {
        // Writers register a name before indexing its first record, so reading
        // entries first leaves every referenced id within the names read
        let entries = self.store.read_all_record_entries()?;
        let names = self.store.read_all_logger_names()?;

        if let Some(bad) = entries.iter().find(|r| r.logger_id as usize >= names.len()) {
            return Err(LogError::Format(format!(
                "record index references unknown logger #{}",
                bad.logger_id
            )));
        }

        for name in names {
            if token.is_cancelled() {
                return Ok(None);
            }
            self.loggers.write().push(name.clone());
            self.listeners.emit(&ViewEvent::NewLogger(name));
        }

        for chunk in entries.chunks(self.page_size) {
            if token.is_cancelled() {
                return Ok(None);
            }
            let len = {
                let mut records = self.records.write();
                records.extend_from_slice(chunk);
                records.len()
            };
            if let Some(event) = pager.on_push(len) {
                self.listeners.emit(&event);
            }
        }

        // Past the terminator of the last indexed record
        Ok(Some(entries.last().map_or(0, |r| r.body_end + 1)))
    }

    /// Parse whatever complete frames were appended since the last poll
    fn poll(&self, cursor: &mut Cursor, pager: &mut Pager, token: &CancelToken) -> Result<Poll> {
        let file = match cursor.file.take() {
            Some(file) => file,
            None => match File::open(self.store.log_path()) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => return Err(LogError::NotReady),
                Err(e) => return Err(e.into()),
            },
        };
        let file = cursor.file.insert(file);
        let len = file.metadata()?.len();

        if len < cursor.offset {
            return Ok(Poll::Shrunk);
        }

        if !cursor.verified {
            let mut head = vec![0u8; SIGNATURE.len().min(len as usize)];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut head)?;
            let signature_len = check_signature(&head)? as u64;

            cursor.verified = true;
            cursor.offset = cursor.offset.max(signature_len);
        }

        if len == cursor.offset {
            return Ok(Poll::Idle);
        }

        self.stable.store(false, Ordering::Release);

        let mut buf = Vec::with_capacity((len - cursor.offset) as usize);
        file.seek(SeekFrom::Start(cursor.offset))?;
        file.by_ref().take(len - cursor.offset).read_to_end(&mut buf)?;

        let mut pos = 0;
        let mut stalled = false;
        while pos < buf.len() && !token.is_cancelled() {
            let decoded = match decode_frame(&buf[pos..]) {
                Ok(decoded) => decoded,
                // A frame caught mid-write decodes as truncated; it only
                // counts as corrupt once the file stops growing
                Err(LogError::Format(reason)) if cursor.stalled_at != Some(len) => {
                    tracing::trace!(
                        "Frame at offset {} not decodable yet: {}",
                        cursor.offset + pos as u64,
                        reason
                    );
                    cursor.stalled_at = Some(len);
                    stalled = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            match decoded {
                Decoded::Incomplete => break,
                Decoded::SessionEnd { consumed } => pos += consumed,
                Decoded::Frame(frame) => {
                    let consumed = frame.consumed;
                    self.push_parsed(frame, cursor.offset + pos as u64, pager);
                    pos += consumed;
                }
            }
        }

        cursor.offset += pos as u64;
        if stalled {
            return Ok(Poll::Idle);
        }
        cursor.stalled_at = None;
        Ok(if pos == 0 { Poll::Idle } else { Poll::Progress })
    }

    /// Append one parsed frame found at absolute offset `base`
    fn push_parsed(&self, frame: DecodedFrame, base: u64, pager: &mut Pager) {
        let (logger_id, is_new) = {
            let mut loggers = self.loggers.write();
            match loggers.iter().position(|name| *name == frame.logger_name) {
                Some(pos) => (pos, false),
                None => {
                    loggers.push(frame.logger_name.clone());
                    (loggers.len() - 1, true)
                }
            }
        };

        // Announce the logger before any record referencing it is visible
        if is_new {
            self.listeners.emit(&ViewEvent::NewLogger(frame.logger_name));
        }

        let record = LogRecord {
            logger_id: logger_id as u32,
            timestamp_millis: frame.timestamp_millis,
            severity: frame.severity,
            body_start: base + frame.body_start as u64,
            body_end: base + frame.body_end as u64,
        };

        let len = {
            let mut records = self.records.write();
            records.push(record);
            records.len()
        };
        if let Some(event) = pager.on_push(len) {
            self.listeners.emit(&event);
        }
    }
}
