//! Sliding-window activity counting.
//!
//! An [`ActivityWindow`] holds the timestamps of recent posts for one
//! `(user, channel)` pair. Expiry happens eagerly on every insert, so the
//! sequence never holds more than one window's worth of entries.

use std::collections::VecDeque;
use std::time::Duration;

/// Window used when the configured one is unusable.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Replace an invalid (zero-length) window with [`DEFAULT_WINDOW`].
pub fn ensure_window(window: Duration) -> Duration {
    if window.is_zero() {
        DEFAULT_WINDOW
    } else {
        window
    }
}

/// Convert a window length in whole seconds, falling back to the default for 0.
pub fn window_from_secs(secs: u64) -> Duration {
    ensure_window(Duration::from_secs(secs))
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Chronologically ordered timestamps (epoch millis) of recent activity.
///
/// # Example
/// ```
/// use slack_patrol::ActivityWindow;
/// use std::time::Duration;
///
/// let mut window = ActivityWindow::new();
/// let span = Duration::from_secs(3);
///
/// assert_eq!(window.record(1_000, span), 1);
/// assert_eq!(window.record(5_000, span), 1); // 1_000 expired
/// assert_eq!(window.record(7_000, span), 2);
/// assert_eq!(window.record(8_000, span), 3); // 5_000 sits on the boundary
/// assert_eq!(window.record(9_000, span), 3); // 5_000 expired
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityWindow {
    timestamps: VecDeque<u64>,
}

impl ActivityWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `timestamp`, drop everything older than `timestamp - window`,
    /// and return the number of timestamps left.
    ///
    /// An entry exactly `window` old is kept.
    pub fn record(&mut self, timestamp: u64, window: Duration) -> usize {
        self.timestamps.push_back(timestamp);
        self.expire(timestamp, window);
        self.timestamps.len()
    }

    /// Drop timestamps strictly older than `now - window`.
    ///
    /// Only the front of the queue is inspected, so the cost is proportional
    /// to the number of expired entries.
    pub fn expire(&mut self, now: u64, window: Duration) {
        let threshold = now.saturating_sub(duration_millis(window));
        while let Some(&oldest) = self.timestamps.front() {
            if oldest < threshold {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Most recent timestamp, if any.
    pub fn newest(&self) -> Option<u64> {
        self.timestamps.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.timestamps.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_window() {
        assert_eq!(ensure_window(Duration::from_secs(30)), Duration::from_secs(30));
        assert_eq!(ensure_window(Duration::ZERO), DEFAULT_WINDOW);
        assert_eq!(window_from_secs(45), Duration::from_secs(45));
        assert_eq!(window_from_secs(0), Duration::from_secs(60));
    }

    #[test]
    fn test_expire_keeps_only_window() {
        let mut window = ActivityWindow::new();
        for ts in [1_000, 5_000, 7_000, 8_000] {
            window.timestamps.push_back(ts);
        }

        window.expire(9_000, Duration::from_millis(3_000));
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![7_000, 8_000]);
    }

    #[test]
    fn test_boundary_timestamp_is_kept() {
        let mut window = ActivityWindow::new();
        let span = Duration::from_millis(1_000);

        window.record(10_000, span);
        assert_eq!(window.record(11_000, span), 2, "exactly window-old stays");
        assert_eq!(window.record(11_001, span), 2, "one millisecond later it goes");
    }

    #[test]
    fn test_never_counts_stale_entries() {
        let mut window = ActivityWindow::new();
        let span = Duration::from_secs(10);

        for i in 0..100u64 {
            let now = i * 1_000;
            window.record(now, span);
            let threshold = now.saturating_sub(10_000);
            assert!(window.iter().all(|ts| ts >= threshold));
        }
        assert_eq!(window.len(), 11);
    }

    #[test]
    fn test_long_gap_clears_history() {
        let mut window = ActivityWindow::new();
        let span = Duration::from_secs(60);

        for ts in 0..50 {
            window.record(ts, span);
        }
        assert_eq!(window.record(10_000_000, span), 1);
        assert_eq!(window.newest(), Some(10_000_000));
    }
}
