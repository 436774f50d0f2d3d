//! In-memory doubles for the persistence and delivery ports.

use crate::application::ports::{
    AuditRecord, AuditSink, CooldownStore, DeliveryError, Notifier, PersistenceError,
};
use crate::domain::decision::MessageKey;
use crate::domain::identity::{CooldownEntry, Identity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Cooldown store that keeps the last saved snapshot in memory.
///
/// `load` returns whatever was saved last.
#[derive(Debug, Default)]
pub struct MemoryCooldownStore {
    entries: Mutex<Vec<CooldownEntry>>,
    saves: AtomicUsize,
    failing: bool,
}

impl MemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `save` always fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Seed the store as if a snapshot had been saved earlier.
    pub fn with_entries(entries: Vec<CooldownEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<CooldownEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CooldownStore for MemoryCooldownStore {
    fn load(&self) -> Result<Vec<CooldownEntry>, PersistenceError> {
        Ok(self.saved())
    }

    fn save(&self, entries: &[CooldownEntry]) -> Result<(), PersistenceError> {
        if self.failing {
            return Err(PersistenceError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        *self.entries.lock().unwrap() = entries.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A warning captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub channel: Identity,
    pub user: Identity,
    pub key: MessageKey,
}

/// Notifier that records every post. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    posts: Arc<Mutex<Vec<Post>>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records the attempt and then fails it.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post_ephemeral_warning(
        &self,
        channel: &Identity,
        user: &Identity,
        key: MessageKey,
    ) -> Result<(), DeliveryError> {
        self.posts.lock().unwrap().push(Post {
            channel: channel.clone(),
            user: user.clone(),
            key,
        });
        if self.failing {
            return Err(DeliveryError::Notification("channel_not_found".to_string()));
        }
        Ok(())
    }
}

/// Audit sink that records every row. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
    failing: bool,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every row without recording it.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record_event(&self, record: AuditRecord) -> Result<(), DeliveryError> {
        if self.failing {
            return Err(DeliveryError::Audit("503 Service Unavailable".to_string()));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}
