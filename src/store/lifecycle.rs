//! Lifecycle hooks
//!
//! Erase and backup are announced to interested readers so they can quiesce
//! before the artifacts change under them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Store lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Fired before the artifacts are truncated or moved away
    StartErasing,
    /// Fired after the artifacts are empty again
    Erased,
}

/// Callback invoked synchronously on the erasing thread
pub type LifecycleHook = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

/// Handle for removing a registered hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Registered hooks, invoked in registration order
#[derive(Default)]
pub(crate) struct LifecycleHooks {
    next_id: AtomicU64,
    hooks: RwLock<Vec<(HookId, LifecycleHook)>>,
}

impl LifecycleHooks {
    pub(crate) fn add(&self, hook: LifecycleHook) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, hook));
        id
    }

    pub(crate) fn remove(&self, id: HookId) {
        self.hooks.write().retain(|(hook_id, _)| *hook_id != id);
    }

    pub(crate) fn fire(&self, event: LifecycleEvent) {
        // Snapshot so a hook may add or remove hooks without deadlocking
        let hooks: Vec<LifecycleHook> = self.hooks.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        tracing::debug!("Lifecycle {:?} -> {} hook(s)", event, hooks.len());
        for hook in hooks {
            hook(event);
        }
    }
}
