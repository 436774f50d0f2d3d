//! Storage implementations for moderation state.
//!
//! Provides concurrent, sharded storage for cooldown entries and activity
//! windows, with optional bounded size.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EvictionCandidate, EvictionPolicy, Storage};
use crate::infrastructure::clock::SystemClock;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Number of entries inspected when choosing an eviction victim.
const EVICTION_SAMPLE_SIZE: usize = 32;

/// A stored value plus the last time it was touched (epoch millis).
#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    last_access: u64,
}

/// Thread-safe sharded storage backed by DashMap.
///
/// DashMap locks one shard per write, so `with_entry_mut` on one key holds
/// off other writers of that key (and its shard) while leaving the rest of
/// the map available.
///
/// With an eviction policy attached, inserting a new key first asks the
/// policy whether the map is full and, if so, evicts one victim chosen from a
/// sample of [`EVICTION_SAMPLE_SIZE`] entries.
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, Slot<V>>,
    clock: Arc<dyn Clock>,
    eviction_policy: Option<Arc<dyn EvictionPolicy<K>>>,
    metrics: Option<Metrics>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new, unbounded sharded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            clock: Arc::new(SystemClock::new()),
            eviction_policy: None,
            metrics: None,
        }
    }

    /// Use `clock` for last-access bookkeeping.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound the storage with an eviction policy.
    pub fn with_eviction_policy(mut self, policy: Arc<dyn EvictionPolicy<K>>) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Count evictions in `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Check if a key exists.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Evict until the policy is satisfied or nothing more can be evicted.
    ///
    /// Must not be called while holding a guard into `map`.
    fn make_room(&self)
    where
        K: fmt::Debug,
    {
        let Some(policy) = &self.eviction_policy else {
            return;
        };

        while policy.should_evict(self.map.len()) {
            let candidates: Vec<EvictionCandidate<K>> = self
                .map
                .iter()
                .take(EVICTION_SAMPLE_SIZE)
                .map(|entry| EvictionCandidate {
                    key: entry.key().clone(),
                    last_access: entry.value().last_access,
                })
                .collect();

            let Some(victim) = policy.select_victim(&candidates) else {
                break;
            };

            if self.map.remove(&victim).is_some() {
                debug!(key = ?victim, "evicted least recently used entry");
                if let Some(metrics) = &self.metrics {
                    metrics.record_eviction();
                }
            }
        }
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedStorage")
            .field("len", &self.map.len())
            .field("eviction_policy", &self.eviction_policy)
            .finish()
    }
}

// Implement the Storage port
impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug,
    V: Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let now = self.clock.now_millis();
        if self.eviction_policy.is_some() && !self.map.contains_key(&key) {
            self.make_room();
        }

        let mut slot = self.map.entry(key).or_insert_with(|| Slot {
            value: factory(),
            last_access: now,
        });
        slot.last_access = now;
        accessor(&mut slot.value)
    }

    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        self.map.get(key).map(|slot| accessor(&slot.value))
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        self.map.clear()
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for entry in self.map.iter() {
            f(entry.key(), &entry.value().value);
        }
    }

    fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.map.retain(|key, slot| f(key, &mut slot.value));
    }
}

// Implement Storage for Arc<ShardedStorage> so one map can back several handles
impl<K, V> Storage<K, V> for Arc<ShardedStorage<K, V>>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug,
    V: Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        (**self).with_entry_mut(key, factory, accessor)
    }

    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        (**self).with_entry(key, accessor)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        (**self).for_each(f)
    }

    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        (**self).retain(f)
    }
}
