//! Bookkeeping for background refreshes.
//!
//! Every refresh the cache spawns is registered here so that
//! - at most one refresh per key runs at a time (when deduplication is on)
//! - `shutdown` can cancel and await all of them before the driver is cleared

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u64,
    /// Every live refresh task, by task id.
    tasks: HashMap<u64, JoinHandle<()>>,
    /// Keys with a deduplicated refresh in flight, mapped to its task id.
    keys: HashMap<String, u64>,
    closed: bool,
}

/// Outcome of [`RefreshTracker::spawn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned,
    /// A refresh for the same key is already running.
    AlreadyInFlight,
    /// The tracker has been shut down.
    Closed,
    /// No tokio runtime is running on this thread.
    RuntimeUnavailable,
}

/// Registry of in-flight refresh tasks.
#[derive(Debug, Default)]
pub struct RefreshTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // The state is plain bookkeeping, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `task` as the refresh for `key`.
    ///
    /// With `dedupe`, nothing is spawned while another deduplicated refresh
    /// for `key` is still registered. Outside a tokio runtime nothing is
    /// spawned and `RuntimeUnavailable` is returned.
    pub fn spawn<F>(&self, key: &str, dedupe: bool, task: F) -> SpawnOutcome
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.lock();
        if state.closed {
            return SpawnOutcome::Closed;
        }
        if dedupe && state.keys.contains_key(key) {
            return SpawnOutcome::AlreadyInFlight;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return SpawnOutcome::RuntimeUnavailable;
        };

        let id = state.next_id;
        state.next_id += 1;

        let shared = Arc::clone(&self.state);
        let dedupe_key = dedupe.then(|| key.to_string());
        // The spawned task cannot deregister before we insert it: it needs
        // the lock we are holding.
        let handle = runtime.spawn(async move {
            let _registration = Registration {
                state: shared,
                id,
                key: dedupe_key,
            };
            task.await;
        });

        state.tasks.insert(id, handle);
        if dedupe {
            state.keys.insert(key.to_string(), id);
        }
        SpawnOutcome::Spawned
    }

    /// Number of refreshes that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether a deduplicated refresh for `key` is running.
    pub fn is_refreshing(&self, key: &str) -> bool {
        self.lock().keys.contains_key(key)
    }

    /// Refuse new refreshes, abort every running one and wait for each to
    /// finish unwinding. Returns how many were cancelled. Idempotent.
    pub async fn shutdown(&self) -> usize {
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.lock();
            state.closed = true;
            state.keys.clear();
            state.tasks.drain().map(|(_, handle)| handle).collect()
        };

        let count = handles.len();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
        count
    }
}

/// Removes a task's entries when it finishes, panics or is aborted.
struct Registration {
    state: Arc<Mutex<TrackerState>>,
    id: u64,
    key: Option<String>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tasks.remove(&self.id);
        if let Some(key) = self.key.take() {
            if state.keys.get(&key) == Some(&self.id) {
                state.keys.remove(&key);
            }
        }
    }
}
