//! Per-key cancellable delayed actions
//!
//! Scheduling an action for a key that already has one pending cancels the old
//! action and starts a fresh timer. Used for the two content-edit tiers, keyed
//! by `(node_id, tier)`.
//!
//! Outside a tokio runtime there is nothing to drive timers, so actions run
//! immediately.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

type Action = Box<dyn FnOnce() + Send + 'static>;

struct PendingAction {
    generation: u64,
    action: Action,
    handle: Option<JoinHandle<()>>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, PendingAction>>>;

pub struct DebounceScheduler<K> {
    pending: PendingMap<K>,
    generation: AtomicU64,
}

impl<K> Default for DebounceScheduler<K> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K> DebounceScheduler<K>
where
    K: Eq + Hash + Ord + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless rescheduled or cancelled first
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            self.cancel(&key);
            action();
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.lock();

        if let Some(previous) = pending.remove(&key) {
            if let Some(handle) = previous.handle {
                handle.abort();
            }
        }

        let map = Arc::clone(&self.pending);
        let task_key = key.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let due = {
                let mut pending = map.lock().unwrap_or_else(PoisonError::into_inner);
                match pending.get(&task_key) {
                    Some(entry) if entry.generation == generation => pending.remove(&task_key),
                    _ => None,
                }
            };
            if let Some(entry) = due {
                (entry.action)();
            }
        });

        pending.insert(
            key,
            PendingAction {
                generation,
                action: Box::new(action),
                handle: Some(handle),
            },
        );
    }

    /// Drop the pending action for `key` without running it
    pub fn cancel(&self, key: &K) -> bool {
        match self.lock().remove(key) {
            Some(entry) => {
                if let Some(handle) = entry.handle {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Run every pending action now, in key order. Returns how many ran.
    pub fn flush_all(&self) -> usize {
        let mut entries: Vec<(K, PendingAction)> = self.lock().drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let count = entries.len();
        for (_, entry) in entries {
            if let Some(handle) = entry.handle {
                handle.abort();
            }
            (entry.action)();
        }
        count
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, PendingAction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> Drop for DebounceScheduler<K> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, entry) in pending.drain() {
            if let Some(handle) = entry.handle {
                handle.abort();
            }
        }
    }
}
