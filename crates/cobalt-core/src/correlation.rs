//! Outstanding-call bookkeeping.
//!
//! The [`CorrelationTable`] pairs each outbound call's echo id with the
//! one-shot channel its caller is waiting on. Many callers register
//! concurrently; the inbound reader resolves. Removal happens exactly once per
//! id, whichever of reply, timeout or shutdown gets there first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::api::ApiResponse;

/// Map of echo id → reply channel.
pub struct CorrelationTable<T = ApiResponse> {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<T>>>,
}

impl<T> CorrelationTable<T> {
    /// Creates an empty table. Ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a fresh id, unique for the lifetime of the table.
    pub fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers the reply channel for `id`.
    ///
    /// Returns `false` and drops `sender` if `id` is already outstanding.
    pub fn register(&self, id: u64, sender: oneshot::Sender<T>) -> bool {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return false;
        }
        pending.insert(id, sender);
        true
    }

    /// Allocates an id and registers a new channel for it in one step.
    pub fn open(&self) -> (u64, oneshot::Receiver<T>) {
        let id = self.allocate();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    /// Delivers `value` to the waiter registered under `id`.
    ///
    /// Returns `true` if an entry existed and was removed, even when its waiter
    /// has already gone away.
    pub fn resolve(&self, id: u64, value: T) -> bool {
        let Some(sender) = self.pending.lock().remove(&id) else {
            debug!(echo = id, "Dropping reply for unknown echo (timed out?)");
            return false;
        };
        if sender.send(value).is_err() {
            trace!(echo = id, "Reply arrived after its caller stopped waiting");
        }
        true
    }

    /// Removes the entry for `id` without delivering anything.
    pub fn abandon(&self, id: u64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Abandons every outstanding entry. Waiters observe a closed channel.
    ///
    /// Returns the number of entries dropped.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        if count > 0 {
            debug!(count, "Clearing pending API calls");
        }
        count
    }

    /// Returns `true` if `id` is outstanding.
    pub fn contains(&self, id: u64) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CorrelationTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("pending", &self.len())
            .finish()
    }
}
