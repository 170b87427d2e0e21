//! Filter Engine
//!
//! Derives a filtered subsequence of a tail engine's records on its own
//! worker, with its own paging. When the predicate filters nothing the engine
//! runs no worker at all and simply exposes the tail's list.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::Result;
use crate::model::{short_logger_name, LogRecord, SeverityBucket};

use super::events::{Listener, Listeners, Pager, ViewEvent};
use super::tail::TailEngine;
use super::worker::{CancelToken, Worker};

// =============================================================================
// Filter State
// =============================================================================

/// Filter predicate: per (short logger name, severity bucket) enablement plus
/// an optional case-insensitive substring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    enabled: HashMap<(String, SeverityBucket), bool>,
    /// Trimmed and lower-cased
    term: String,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every bucket of `logger_name` known, enabled unless already set
    pub fn register_logger(&mut self, logger_name: &str) {
        let short = short_logger_name(logger_name);
        for bucket in SeverityBucket::ALL {
            self.enabled.entry((short.to_string(), bucket)).or_insert(true);
        }
    }

    pub fn set_enabled(&mut self, logger_name: &str, bucket: SeverityBucket, enabled: bool) {
        let short = short_logger_name(logger_name).to_string();
        self.enabled.insert((short, bucket), enabled);
    }

    /// Enable or disable every bucket of one logger
    pub fn set_logger_enabled(&mut self, logger_name: &str, enabled: bool) {
        for bucket in SeverityBucket::ALL {
            self.set_enabled(logger_name, bucket, enabled);
        }
    }

    /// Enable or disable one bucket across every known logger
    pub fn set_bucket_enabled(&mut self, bucket: SeverityBucket, enabled: bool) {
        for ((_, b), value) in self.enabled.iter_mut() {
            if *b == bucket {
                *value = enabled;
            }
        }
    }

    /// Combinations never seen default to enabled
    pub fn is_enabled(&self, logger_name: &str, bucket: SeverityBucket) -> bool {
        let key = (short_logger_name(logger_name).to_string(), bucket);
        self.enabled.get(&key).copied().unwrap_or(true)
    }

    pub fn set_term(&mut self, term: &str) {
        self.term = term.trim().to_lowercase();
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// No term and nothing disabled: filtering would keep every record
    pub fn is_no_filter(&self) -> bool {
        self.term.is_empty() && self.enabled.values().all(|&enabled| enabled)
    }
}

// =============================================================================
// Filter Engine
// =============================================================================

/// Filtered view layered over a `TailEngine`
pub struct FilterEngine {
    shared: Arc<FilterShared>,
}

struct FilterShared {
    tail: Arc<TailEngine>,
    page_size: usize,
    poll_interval: Duration,

    /// Current predicate; each pass works on its own copy
    state: Mutex<FilterState>,
    /// Written only by the pass worker
    filtered: RwLock<Vec<LogRecord>>,
    /// No filter active: the view is the tail's list
    bypass: AtomicBool,
    stable: AtomicBool,
    /// Tail records the current pass has consumed
    scanned: AtomicUsize,
    listeners: Listeners,
    /// Held for the whole of apply/restart so passes never overlap
    worker: Mutex<Option<Worker>>,
}

impl FilterEngine {
    /// Layer a filter over `tail`, initially in bypass
    pub fn new(tail: Arc<TailEngine>, config: &Config) -> Self {
        let shared = Arc::new(FilterShared {
            page_size: config.page_size.max(1),
            poll_interval: config.poll_interval(),
            state: Mutex::new(FilterState::new()),
            filtered: RwLock::new(Vec::new()),
            bypass: AtomicBool::new(true),
            stable: AtomicBool::new(false),
            scanned: AtomicUsize::new(0),
            listeners: Listeners::default(),
            worker: Mutex::new(None),
            tail: Arc::clone(&tail),
        });

        let weak: Weak<FilterShared> = Arc::downgrade(&shared);
        tail.add_listener(Arc::new(move |event: &ViewEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.on_tail_event(event);
            }
        }));

        // Loggers seen before the listener was attached
        {
            let mut state = shared.state.lock();
            for name in tail.loggers() {
                state.register_logger(&name);
            }
        }

        Self { shared }
    }

    /// Install a new predicate
    ///
    /// Cancels the running pass and waits for it, then either bypasses (no
    /// filter) or starts a fresh pass from the first record.
    pub fn apply(&self, state: FilterState) -> Result<()> {
        self.shared.apply(state)
    }

    /// Current predicate
    pub fn state(&self) -> FilterState {
        self.shared.state.lock().clone()
    }

    /// Re-apply the current predicate with one logger toggled
    pub fn set_logger_enabled(&self, logger_name: &str, enabled: bool) -> Result<()> {
        let mut state = self.state();
        state.set_logger_enabled(logger_name, enabled);
        self.apply(state)
    }

    /// Re-apply the current predicate with a new substring
    pub fn set_term(&self, term: &str) -> Result<()> {
        let mut state = self.state();
        state.set_term(term);
        self.apply(state)
    }

    /// Evaluate `record` against the current predicate
    pub fn is_applicable(&self, record: &LogRecord) -> bool {
        let state = self.state();
        self.shared.is_applicable(&state, record)
    }

    /// Stop the running pass, if any
    pub fn stop(&self) {
        let worker = self.shared.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    pub fn add_listener(&self, listener: Listener) {
        self.shared.listeners.add(listener);
    }

    pub fn is_bypassed(&self) -> bool {
        self.shared.bypass.load(Ordering::Acquire)
    }

    /// Caught up with the tail, and the tail with the file
    pub fn is_stable(&self) -> bool {
        if self.is_bypassed() {
            self.shared.tail.is_stable()
        } else {
            self.shared.stable.load(Ordering::Acquire)
                && self.shared.scanned.load(Ordering::Acquire) >= self.shared.tail.len()
        }
    }

    pub fn tail(&self) -> &Arc<TailEngine> {
        &self.shared.tail
    }

    // =========================================================================
    // Record Access
    // =========================================================================

    pub fn len(&self) -> usize {
        if self.is_bypassed() {
            self.shared.tail.len()
        } else {
            self.shared.filtered.read().len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<LogRecord> {
        if self.is_bypassed() {
            self.shared.tail.get(index)
        } else {
            self.shared.filtered.read().get(index).copied()
        }
    }

    /// Records in `range` of the view, clamped to its length
    pub fn records(&self, range: Range<usize>) -> Vec<LogRecord> {
        if self.is_bypassed() {
            return self.shared.tail.records(range);
        }
        let filtered = self.shared.filtered.read();
        let end = range.end.min(filtered.len());
        let start = range.start.min(end);
        filtered[start..end].to_vec()
    }

    /// Copy of the whole view
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records(0..usize::MAX)
    }
}

impl Drop for FilterEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl FilterShared {
    fn apply(self: &Arc<Self>, mut state: FilterState) -> Result<()> {
        let mut slot = self.worker.lock();
        if let Some(worker) = slot.take() {
            worker.stop();
        }

        for name in self.tail.loggers() {
            state.register_logger(&name);
        }

        self.filtered.write().clear();
        self.stable.store(false, Ordering::Release);
        self.scanned.store(0, Ordering::Release);

        let no_filter = state.is_no_filter();
        *self.state.lock() = state.clone();
        self.bypass.store(no_filter, Ordering::Release);

        if no_filter {
            tracing::debug!("Filter cleared; bypassing");
        } else {
            tracing::debug!("Filter applied (term={:?})", state.term());
            *slot = Some(self.spawn_pass(state)?);
        }
        drop(slot);

        self.listeners.emit(&ViewEvent::FilterChanged);
        Ok(())
    }

    /// Restart the pass from scratch after the tail was reset
    fn restart(self: &Arc<Self>) {
        let mut slot = self.worker.lock();
        if let Some(worker) = slot.take() {
            worker.stop();
        }

        self.filtered.write().clear();
        self.stable.store(false, Ordering::Release);
        self.scanned.store(0, Ordering::Release);

        if !self.bypass.load(Ordering::Acquire) {
            let state = self.state.lock().clone();
            match self.spawn_pass(state) {
                Ok(worker) => *slot = Some(worker),
                Err(e) => tracing::error!("Failed to restart filter pass: {}", e),
            }
        }
    }

    fn spawn_pass(self: &Arc<Self>, state: FilterState) -> Result<Worker> {
        let shared = Arc::clone(self);
        Worker::spawn("harnesslog-filter", move |token| {
            shared.run_pass(&state, &token)
        })
    }

    fn on_tail_event(self: &Arc<Self>, event: &ViewEvent) {
        match event {
            ViewEvent::NewPage { .. } => {
                if self.bypass.load(Ordering::Acquire) {
                    self.listeners.emit(event);
                }
            }
            ViewEvent::NewLogger(name) => {
                self.state.lock().register_logger(name);
                self.listeners.emit(event);
            }
            ViewEvent::RemoveAllLoggers => {
                self.restart();
                self.listeners.emit(event);
            }
            ViewEvent::FilterChanged => {}
        }
    }

    // =========================================================================
    // Worker Body
    // =========================================================================

    /// Scan the tail's list from the start, then keep following its end
    fn run_pass(&self, state: &FilterState, token: &CancelToken) {
        let mut cursor = 0usize;
        let mut pager = Pager::new(self.page_size);

        loop {
            if token.is_cancelled() {
                return;
            }

            let batch = self.tail.records(cursor..cursor.saturating_add(self.page_size));
            if batch.is_empty() {
                // The tail may have grown between the batch read and now
                if self.tail.is_stable() && self.tail.len() <= cursor {
                    self.stable.store(true, Ordering::Release);
                    let len = self.filtered.read().len();
                    if let Some(event) = pager.on_stable(len) {
                        self.listeners.emit(&event);
                    }
                }
                if !token.sleep(self.poll_interval) {
                    return;
                }
                continue;
            }

            self.stable.store(false, Ordering::Release);
            for record in batch {
                if token.is_cancelled() {
                    return;
                }
                if self.is_applicable(state, &record) {
                    let len = {
                        let mut filtered = self.filtered.write();
                        filtered.push(record);
                        filtered.len()
                    };
                    if let Some(event) = pager.on_push(len) {
                        self.listeners.emit(&event);
                    }
                }
                cursor += 1;
                self.scanned.store(cursor, Ordering::Release);
            }
        }
    }

    /// Enablement first, then the substring against header and message
    fn is_applicable(&self, state: &FilterState, record: &LogRecord) -> bool {
        let Some(logger) = self.tail.logger_name(record.logger_id) else {
            return false;
        };
        if !state.is_enabled(&logger, record.bucket()) {
            return false;
        }

        let term = state.term();
        if term.is_empty() {
            return true;
        }
        if self.tail.render_header(record).to_lowercase().contains(term) {
            return true;
        }
        self.tail.message(record).to_lowercase().contains(term)
    }
}
