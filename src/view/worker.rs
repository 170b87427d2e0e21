//! Background worker with cooperative cancellation
//!
//! A worker sleeps on a wake channel instead of `thread::sleep`, so both a
//! stop request and an explicit wake interrupt it immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::Result;

/// Handed to the worker body; checked at every loop iteration
pub struct CancelToken {
    stop: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Sleep up to `timeout`, returning early on wake or stop.
    /// Returns false once the worker should exit.
    pub fn sleep(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.wake.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// A named background thread that can be woken and stopped
pub struct Worker {
    name: String,
    stop: Arc<AtomicBool>,
    wake: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new named thread
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        // One pending wake is enough; extra wakes coalesce
        let (wake_tx, wake_rx) = bounded(1);

        let token = CancelToken {
            stop: Arc::clone(&stop),
            wake: wake_rx,
        };
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;

        tracing::debug!("Worker {} started", name);

        Ok(Self {
            name: name.to_string(),
            stop,
            wake: wake_tx,
            handle: Some(handle),
        })
    }

    /// Interrupt the current sleep without stopping
    pub fn wake(&self) {
        let _ = self.wake.try_send(());
    }

    /// True once the thread body has returned
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancel, wake and join
    ///
    /// When called from the worker's own thread the join is skipped; the
    /// body exits at its next cancellation check.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.wake();

        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("Worker {} panicked", self.name);
        } else {
            tracing::debug!("Worker {} stopped", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
