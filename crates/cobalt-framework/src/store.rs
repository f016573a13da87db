//! The registration store.
//!
//! [`MatcherStore`] owns the canonical, priority-ordered matcher list behind a
//! read/write lock. Mutations (insert, remove, priority change) take the write
//! lock and re-sort; the dispatch loop only takes the read lock to snapshot
//! the list and to copy a candidate's state, and runs handlers with no lock
//! held.
//!
//! Order is ascending priority, ties broken by insertion order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use cobalt_core::State;

use crate::matcher::{Matcher, MatcherId};

struct Entry {
    seq: u64,
    matcher: Matcher,
}

#[derive(Default)]
pub(crate) struct StoreShared {
    entries: RwLock<Vec<Entry>>,
    next_seq: AtomicU64,
}

/// Shared, ordered matcher collection.
#[derive(Clone, Default)]
pub struct MatcherStore {
    shared: Arc<StoreShared>,
}

fn resort(entries: &mut [Entry]) {
    entries.sort_by_key(|e| (e.matcher.priority(), e.seq));
}

impl MatcherStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_shared(shared: Arc<StoreShared>) -> Self {
        Self { shared }
    }

    /// Inserts a matcher at its priority position.
    ///
    /// Returns `false` if it is already stored here.
    pub fn insert(&self, matcher: &Matcher) -> bool {
        let mut entries = self.shared.entries.write();
        if entries.iter().any(|e| e.matcher == *matcher) {
            return false;
        }
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        matcher.attach(Arc::downgrade(&self.shared));
        entries.push(Entry {
            seq,
            matcher: matcher.clone(),
        });
        resort(&mut entries);
        trace!(matcher = %matcher.label(), priority = matcher.priority(), "Matcher stored");
        true
    }

    /// Removes a matcher by identity.
    ///
    /// Returns `false` if it was not stored here.
    pub fn remove(&self, matcher: &Matcher) -> bool {
        self.remove_by_id(matcher.id())
    }

    /// Removes the matcher with the given id.
    pub fn remove_by_id(&self, id: MatcherId) -> bool {
        let mut entries = self.shared.entries.write();
        let Some(index) = entries.iter().position(|e| e.matcher.id() == id) else {
            return false;
        };
        let entry = entries.remove(index);
        entry.matcher.detach();
        trace!(matcher = %entry.matcher.label(), "Matcher removed");
        true
    }

    /// Changes a matcher's priority and re-sorts.
    pub fn set_priority(&self, matcher: &Matcher, priority: i32) {
        let mut entries = self.shared.entries.write();
        matcher.set_priority_unsynced(priority);
        resort(&mut entries);
    }

    /// The current ordered list.
    pub fn snapshot(&self) -> Vec<Matcher> {
        self.shared
            .entries
            .read()
            .iter()
            .map(|e| e.matcher.clone())
            .collect()
    }

    /// Copies a stored matcher's state.
    ///
    /// Returns `None` if the matcher has been removed since the snapshot.
    pub fn checkout(&self, matcher: &Matcher) -> Option<State> {
        let entries = self.shared.entries.read();
        entries
            .iter()
            .any(|e| e.matcher == *matcher)
            .then(|| matcher.state())
    }

    /// Returns `true` if a matcher with this id is stored.
    pub fn contains(&self, id: MatcherId) -> bool {
        self.shared.entries.read().iter().any(|e| e.matcher.id() == id)
    }

    /// Number of stored matchers.
    pub fn len(&self) -> usize {
        self.shared.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.shared.entries.read().is_empty()
    }

    /// Removes every matcher, returning how many there were.
    pub fn clear(&self) -> usize {
        let drained: Vec<Entry> = self.shared.entries.write().drain(..).collect();
        for entry in &drained {
            entry.matcher.detach();
        }
        drained.len()
    }
}

impl std::fmt::Debug for MatcherStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatcherStore").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn matcher(priority: i32) -> Matcher {
        Matcher::builder().priority(priority).build()
    }

    fn priorities(store: &MatcherStore) -> Vec<i32> {
        store.snapshot().iter().map(Matcher::priority).collect()
    }

    #[test]
    fn keeps_priority_order_with_stable_ties() {
        let store = MatcherStore::new();
        let a = matcher(10);
        let b = matcher(1);
        let c = matcher(10);
        let d = matcher(5);
        for m in [&a, &b, &c, &d] {
            assert!(store.insert(m));
        }

        let order: Vec<_> = store.snapshot().iter().map(Matcher::id).collect();
        assert_eq!(order, vec![b.id(), d.id(), a.id(), c.id()]);
        assert!(!store.insert(&a));
    }

    #[test]
    fn priority_change_resorts() {
        let store = MatcherStore::new();
        let a = matcher(1);
        let b = matcher(2);
        store.insert(&a);
        store.insert(&b);

        a.set_priority(3);
        assert_eq!(store.snapshot()[0], b);
        assert_eq!(priorities(&store), vec![2, 3]);

        // equal priority falls back to insertion order
        b.set_priority(3);
        assert_eq!(store.snapshot(), vec![a.clone(), b.clone()]);
    }

    #[test]
    fn delete_through_handle() {
        let store = MatcherStore::new();
        let a = matcher(0);
        store.insert(&a);

        assert!(a.is_stored());
        assert!(store.checkout(&a).is_some());
        assert!(a.delete());
        assert!(!a.delete());
        assert!(store.checkout(&a).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_detaches_everything() {
        let store = MatcherStore::new();
        let a = matcher(0);
        store.insert(&a);
        store.insert(&matcher(1));

        assert_eq!(store.clear(), 2);
        assert!(!a.is_stored());
        assert!(!a.delete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutation_keeps_order_and_set() {
        let store = MatcherStore::new();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let keep = matcher((i * 7) % 11);
                    let drop_me = matcher(i % 5);
                    store.insert(&keep);
                    store.insert(&drop_me);
                    let _ = store.snapshot();
                    tokio::task::yield_now().await;
                    assert!(drop_me.delete());
                    keep.id()
                })
            })
            .collect();

        let mut expected = HashSet::new();
        for task in tasks {
            expected.insert(task.await.unwrap());
        }

        let snapshot = store.snapshot();
        let actual: HashSet<_> = snapshot.iter().map(Matcher::id).collect();
        assert_eq!(actual, expected);
        assert!(priorities(&store).is_sorted());
    }
}
