//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::decision::{MessageKey, RuleName};
use crate::domain::event::MessageEvent;
use crate::domain::identity::{CooldownEntry, Identity};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::path::PathBuf;

/// Candidate entry for eviction consideration.
pub struct EvictionCandidate<K> {
    /// The key of the entry
    pub key: K,
    /// Last access time (epoch millis) for LRU-based strategies
    pub last_access: u64,
}

/// Port for eviction policy decisions.
///
/// The storage layer delegates "is it full?" and "which one goes?" to this
/// policy. Infrastructure provides `LruEviction`.
pub trait EvictionPolicy<K>: Send + Sync + Debug
where
    K: Clone,
{
    /// Select a victim from the given candidates, or `None` to skip eviction.
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K>;

    /// Check if eviction should be triggered before inserting a new key.
    fn should_evict(&self, current_entries: usize) -> bool;
}

/// Port for obtaining current wall-clock time.
///
/// Cooldown timestamps are persisted across restarts, so the clock reports
/// milliseconds since the Unix epoch rather than a monotonic instant.
/// Infrastructure provides `SystemClock` and, for tests, `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Port for concurrent key-value storage.
///
/// Implementations must give `with_entry_mut` exclusive access to the entry
/// for the whole accessor call: concurrent callers for the same key are
/// serialized, callers for different keys may run in parallel.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Read an existing entry without creating it.
    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Error raised by a [`CooldownStore`].
#[derive(Debug)]
pub enum PersistenceError {
    /// Reading or writing the backing file failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The blocking write task did not complete
    Task(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io { path, source } => {
                write!(f, "cooldown state I/O on {}: {}", path.display(), source)
            }
            PersistenceError::Task(reason) => write!(f, "cooldown save task failed: {}", reason),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io { source, .. } => Some(source),
            PersistenceError::Task(_) => None,
        }
    }
}

/// Port for durable cooldown snapshots.
///
/// `save` replaces the whole stored snapshot; it is never an append.
pub trait CooldownStore: Send + Sync + Debug {
    /// Load every stored entry. A missing store is an empty one.
    fn load(&self) -> Result<Vec<CooldownEntry>, PersistenceError>;

    /// Replace the stored snapshot with `entries`.
    fn save(&self, entries: &[CooldownEntry]) -> Result<(), PersistenceError>;
}

/// Port for message-text heuristics.
pub trait TextClassifier: Send + Sync + Debug {
    /// True if the text contains a recognisable user mention.
    fn contains_user_mention(&self, text: &str) -> bool;

    /// True if the text looks like a reply written outside a thread.
    fn looks_like_reply(&self, text: &str) -> bool;
}

/// Error reported by a delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The warning could not be posted
    Notification(String),
    /// The audit record could not be recorded
    Audit(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Notification(e) => write!(f, "notification failed: {}", e),
            DeliveryError::Audit(e) => write!(f, "audit failed: {}", e),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Port for posting warnings visible only to the offending user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_ephemeral_warning(
        &self,
        channel: &Identity,
        user: &Identity,
        key: MessageKey,
    ) -> Result<(), DeliveryError>;
}

/// Maximum number of characters of message text carried in an audit record.
pub const AUDIT_TEXT_LIMIT: usize = 500;

/// One row for the external audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// RFC 3339 time the warning was issued
    pub timestamp: String,
    pub rule: RuleName,
    pub user: Identity,
    pub channel: Identity,
    pub ts: String,
    /// Message text, truncated to [`AUDIT_TEXT_LIMIT`] characters
    pub text: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AuditRecord {
    pub fn new(
        rule: RuleName,
        event: &MessageEvent,
        extra: BTreeMap<String, Value>,
        timestamp: String,
    ) -> Self {
        Self {
            timestamp,
            rule,
            user: event.user.clone(),
            channel: event.channel.clone(),
            ts: event.ts.clone(),
            text: event.text.chars().take(AUDIT_TEXT_LIMIT).collect(),
            extra,
        }
    }
}

/// Port for the best-effort audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_event(&self, record: AuditRecord) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_truncates_by_chars() {
        let text = "あ".repeat(600);
        let event = MessageEvent::new("U1", "C1", text).with_ts("1.2");
        let record = AuditRecord::new(RuleName::Flood, &event, BTreeMap::new(), "t".into());

        assert_eq!(record.text.chars().count(), AUDIT_TEXT_LIMIT);
        assert_eq!(record.ts, "1.2");
    }

    #[test]
    fn test_audit_record_flattens_extra() {
        let event = MessageEvent::new("U1", "C1", "spam");
        let mut extra = BTreeMap::new();
        extra.insert("count".to_string(), Value::from(3));
        let record = AuditRecord::new(
            RuleName::Flood,
            &event,
            extra,
            "2025-05-01T00:00:00+00:00".into(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["rule"], "flood");
        assert_eq!(json["count"], 3);
        assert_eq!(json["user"], "U1");
    }
}
