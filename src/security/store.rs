//! Counter storage for the fixed-window rate limiter.
//!
//! The limiter only talks to [`CounterStore`]. [`InMemoryCounterStore`] keeps
//! counters in this process and is therefore not shared between gateway
//! instances; a multi-instance deployment needs a store backed by a shared
//! cache that offers the same compare-and-swap.

use std::fmt::Debug;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// State of one (identity, route) window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub count: u32,
    /// Milliseconds since the epoch at which this window ends.
    pub window_reset_at: u64,
}

impl WindowCounter {
    pub fn start(now_millis: u64, window_millis: u64) -> Self {
        Self {
            count: 1,
            window_reset_at: now_millis.saturating_add(window_millis),
        }
    }

    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.window_reset_at
    }

    pub fn incremented(&self) -> Self {
        Self {
            count: self.count.saturating_add(1),
            window_reset_at: self.window_reset_at,
        }
    }
}

/// Port for counter persistence.
pub trait CounterStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Option<WindowCounter>;

    fn put(&self, key: &str, counter: WindowCounter);

    /// Store `new` only if the current value equals `expected`
    /// (`None` meaning "no entry"). Returns whether the swap happened.
    fn compare_and_swap(&self, key: &str, expected: Option<&WindowCounter>, new: WindowCounter) -> bool;

    /// Number of tracked keys, expired ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store on a sharded concurrent map.
///
/// Expired windows are replaced on the next request for their key, never
/// evicted in the background.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, WindowCounter>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn get(&self, key: &str) -> Option<WindowCounter> {
        self.counters.get(key).map(|r| *r.value())
    }

    fn put(&self, key: &str, counter: WindowCounter) {
        self.counters.insert(key.to_string(), counter);
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&WindowCounter>, new: WindowCounter) -> bool {
        // The entry guard holds the shard lock for the whole compare + write.
        match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if expected == Some(e.get()) {
                    e.insert(new);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(e) => {
                if expected.is_none() {
                    e.insert(new);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_on_vacant_and_occupied() {
        let store = InMemoryCounterStore::new();
        let first = WindowCounter::start(0, 1_000);

        assert!(!store.compare_and_swap("k", Some(&first), first));
        assert!(store.compare_and_swap("k", None, first));
        assert!(!store.compare_and_swap("k", None, first));

        let next = first.incremented();
        assert!(store.compare_and_swap("k", Some(&first), next));
        assert!(!store.compare_and_swap("k", Some(&first), next.incremented()));
        assert_eq!(store.get("k"), Some(next));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_window_expiry_boundary() {
        let c = WindowCounter::start(500, 1_000);
        assert_eq!(c.window_reset_at, 1_500);
        assert!(!c.is_expired(1_499));
        assert!(c.is_expired(1_500));
    }

    #[test]
    fn test_put_overwrites() {
        let store = InMemoryCounterStore::new();
        store.put("k", WindowCounter::start(0, 10));
        store.put("k", WindowCounter::start(100, 10));
        assert_eq!(store.get("k").map(|c| c.window_reset_at), Some(110));
    }
}
