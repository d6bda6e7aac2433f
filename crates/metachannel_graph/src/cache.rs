//! A coalescing, TTL-bounded in-memory cache.
//!
//! Concurrent requests for the same key are deduplicated: only the first
//! caller executes the initialization future, every other caller waits on
//! its outcome over a broadcast channel and receives the same value or the
//! same error. Published entries are immutable; they expire after a fixed
//! TTL and the map is bounded, inserting past capacity evicts the oldest
//! entries.

use std::{
    future::Future,
    hash::Hash,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;

enum Slot<V, E> {
    /// An initialization is in flight; waiters subscribe to the sender.
    Pending(Weak<broadcast::Sender<Result<V, E>>>),

    /// A published value and the instant it was published.
    Fetched(V, Instant),
}

/// A thread-safe map combining single-flight initialization with TTL and
/// capacity bounds.
pub struct CoalescedTtlCache<K, V, E>
where
    K: Eq + Hash,
{
    map: DashMap<K, Slot<V, E>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V, E> CoalescedTtlCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache with the given bounds.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            map: DashMap::new(),
            ttl,
            capacity,
        }
    }

    /// The number of live published entries.
    pub fn len(&self) -> usize {
        self.map
            .iter()
            .filter(|entry| match entry.value() {
                Slot::Fetched(_, fetched_at) => fetched_at.elapsed() < self.ttl,
                Slot::Pending(_) => false,
            })
            .count()
    }

    /// Returns true if there are no live published entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value for `key`, initializing it at most once.
    ///
    /// Concurrent calls for the same key are coalesced: the first caller runs
    /// `init` while the others await its outcome and observe the same value
    /// or the same error. A successful value is published for the TTL; a
    /// failure publishes nothing, so the next caller retries. If the
    /// initializing caller is dropped mid-flight, a waiter takes over the
    /// initialization.
    pub async fn get_or_try_init<F, Fut>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut init = Some(init);
        loop {
            let sender = match self.map.entry(key.clone()) {
                Entry::Vacant(entry) => {
                    let (tx, _) = broadcast::channel(1);
                    let tx = Arc::new(tx);
                    entry.insert(Slot::Pending(Arc::downgrade(&tx)));
                    tx
                }
                Entry::Occupied(mut entry) => match entry.get() {
                    Slot::Fetched(value, fetched_at) if fetched_at.elapsed() < self.ttl => {
                        return Ok(value.clone());
                    }
                    Slot::Pending(weak_tx) => {
                        if let Some(tx) = weak_tx.upgrade() {
                            // Subscribe before releasing the entry so the
                            // send cannot be missed.
                            let mut rx = tx.subscribe();
                            drop(tx);
                            drop(entry);
                            match rx.recv().await {
                                Ok(result) => return result,
                                // The initializer was dropped before
                                // publishing; race for the slot again.
                                Err(_) => continue,
                            }
                        }

                        // The previous initializer is gone, take over.
                        let (tx, _) = broadcast::channel(1);
                        let tx = Arc::new(tx);
                        entry.insert(Slot::Pending(Arc::downgrade(&tx)));
                        tx
                    }
                    // Expired: this caller refreshes the entry.
                    Slot::Fetched(..) => {
                        let (tx, _) = broadcast::channel(1);
                        let tx = Arc::new(tx);
                        entry.insert(Slot::Pending(Arc::downgrade(&tx)));
                        tx
                    }
                },
            };

            // We won the race and are the initializer for this key.
            let init = init.take().expect("an initializer ran twice");
            let result = init().await;
            match &result {
                Ok(value) => {
                    self.map
                        .insert(key, Slot::Fetched(value.clone(), Instant::now()));
                    self.evict_over_capacity();
                }
                Err(_) => {
                    // Never publish a negative entry. Only clear the pending
                    // marker if it is still ours; a concurrent sweep may have
                    // replaced it already.
                    if let Entry::Occupied(entry) = self.map.entry(key) {
                        if let Slot::Pending(weak_tx) = entry.get() {
                            if weak_tx.as_ptr() == Arc::as_ptr(&sender) {
                                entry.remove();
                            }
                        }
                    }
                }
            }
            let _ = sender.send(result.clone());
            return result;
        }
    }

    /// Removes expired and abandoned entries.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.map.retain(|_, slot| match slot {
            Slot::Fetched(_, fetched_at) => fetched_at.elapsed() < ttl,
            Slot::Pending(weak_tx) => weak_tx.strong_count() > 0,
        });
    }

    fn evict_over_capacity(&self) {
        if self.map.len() <= self.capacity {
            return;
        }
        self.sweep();
        while self.map.len() > self.capacity {
            let oldest = self
                .map
                .iter()
                .filter_map(|entry| match entry.value() {
                    Slot::Fetched(_, fetched_at) => Some((entry.key().clone(), *fetched_at)),
                    Slot::Pending(_) => None,
                })
                .min_by_key(|(_, fetched_at)| *fetched_at);
            match oldest {
                Some((key, _)) => {
                    self.map.remove(&key);
                }
                None => break,
            }
        }
    }
}
