//! View events and listener plumbing

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver};
use parking_lot::RwLock;

/// Notifications published by the tail and filter engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// Records `start..end` form page `page` (0-based). A partial trailing
    /// page is re-announced with a larger `end` as it fills.
    NewPage { start: usize, end: usize, page: usize },
    /// A logger name was seen for the first time
    NewLogger(String),
    /// The view was reset; all records and loggers are gone
    RemoveAllLoggers,
    /// A new filter predicate took effect
    FilterChanged,
}

/// Callback invoked synchronously on a worker thread.
/// Must not mutate anything it is handed, and must not stop the engine
/// that is calling it.
pub type Listener = Arc<dyn Fn(&ViewEvent) + Send + Sync>;

/// Listener adapter that forwards every event into a channel
pub fn channel_listener() -> (Listener, Receiver<ViewEvent>) {
    let (tx, rx) = unbounded();
    let listener: Listener = Arc::new(move |event: &ViewEvent| {
        let _ = tx.send(event.clone());
    });
    (listener, rx)
}

#[derive(Default)]
pub(crate) struct Listeners {
    inner: RwLock<Vec<Listener>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Listener) {
        self.inner.write().push(listener);
    }

    pub(crate) fn emit(&self, event: &ViewEvent) {
        let listeners = self.inner.read().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

/// Page boundary bookkeeping for one growing list
pub(crate) struct Pager {
    page_size: usize,
    /// List length covered by the last announcement
    announced: usize,
}

impl Pager {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            announced: 0,
        }
    }

    /// Call after each push; yields an event when a page completes
    pub(crate) fn on_push(&mut self, len: usize) -> Option<ViewEvent> {
        if len == 0 || len % self.page_size != 0 {
            return None;
        }
        self.announced = len;
        Some(ViewEvent::NewPage {
            start: len - self.page_size,
            end: len,
            page: len / self.page_size - 1,
        })
    }

    /// Call when caught up; yields the trailing partial page once per length
    pub(crate) fn on_stable(&mut self, len: usize) -> Option<ViewEvent> {
        let partial = len % self.page_size;
        if partial == 0 || len == self.announced {
            return None;
        }
        self.announced = len;
        Some(ViewEvent::NewPage {
            start: len - partial,
            end: len,
            page: len / self.page_size,
        })
    }
}
