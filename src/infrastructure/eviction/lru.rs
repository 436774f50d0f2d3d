//! LRU (Least Recently Used) eviction adapter.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// LRU eviction policy with entry count limit.
///
/// Evicts the least recently touched entry when the limit is reached.
/// Storage passes a bounded sample of entries, so the choice is approximate
/// once the map is larger than the sample.
#[derive(Debug, Clone)]
pub struct LruEviction {
    /// Maximum number of entries before eviction
    max_entries: usize,
}

impl LruEviction {
    /// Create a new LRU eviction policy with the given entry limit.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K> EvictionPolicy<K> for LruEviction
where
    K: Clone,
{
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        candidates
            .iter()
            .min_by_key(|candidate| candidate.last_access)
            .map(|candidate| candidate.key.clone())
    }

    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries >= self.max_entries
    }
}
