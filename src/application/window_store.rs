//! Sliding-window activity store for flood detection.
//!
//! Holds one [`ActivityWindow`] per `(user, channel)` pair. The append and the
//! trim of a `record` call happen under the storage's per-key lock, so
//! concurrent records for the same pair are linearizable.

use crate::application::ports::Storage;
use crate::domain::identity::ActivityKey;
use crate::domain::window::{ensure_window, ActivityWindow};
use std::time::Duration;

/// Keyed collection of activity windows sharing one window length.
#[derive(Debug, Clone)]
pub struct WindowStore<S>
where
    S: Storage<ActivityKey, ActivityWindow> + Clone,
{
    storage: S,
    window: Duration,
}

impl<S> WindowStore<S>
where
    S: Storage<ActivityKey, ActivityWindow> + Clone,
{
    /// Create a store. A zero window falls back to the 60 second default.
    pub fn new(storage: S, window: Duration) -> Self {
        Self {
            storage,
            window: ensure_window(window),
        }
    }

    /// The store-wide window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record activity for `key` at `timestamp` (epoch millis) and return how
    /// many timestamps remain inside the window.
    pub fn record(&self, key: ActivityKey, timestamp: u64) -> usize {
        self.record_with_window(key, timestamp, self.window)
    }

    /// Like [`record`](Self::record) with a per-call window length.
    pub fn record_with_window(&self, key: ActivityKey, timestamp: u64, window: Duration) -> usize {
        let window = ensure_window(window);
        self.storage
            .with_entry_mut(key, ActivityWindow::new, |activity| {
                activity.record(timestamp, window)
            })
    }

    /// Current count for `key` without recording anything.
    pub fn count(&self, key: &ActivityKey) -> usize {
        self.storage.with_entry(key, ActivityWindow::len).unwrap_or(0)
    }

    /// Expire old timestamps everywhere and drop pairs with no recent activity.
    pub fn sweep(&self, now: u64) {
        let window = self.window;
        self.storage.retain(|_, activity| {
            activity.expire(now, window);
            !activity.is_empty()
        });
    }

    /// Number of tracked pairs.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Forget all activity.
    pub fn clear(&self) {
        self.storage.clear();
    }
}
