//! Observability metrics for moderation.
//!
//! Provides counters about evaluation, admission and delivery for monitoring
//! and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking moderation statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Events that reached rule evaluation
    events_evaluated: AtomicU64,
    /// Events skipped before any rule ran
    events_skipped: AtomicU64,
    /// Evaluations aborted by a fault
    evaluation_failures: AtomicU64,
    /// Matched rules whose cooldown gates both granted
    warnings_admitted: AtomicU64,
    /// Matched rules denied by a cooldown gate
    warnings_denied: AtomicU64,
    /// Keys evicted from bounded storage
    entries_evicted: AtomicU64,
    /// Warnings the notifier failed to post
    delivery_failures: AtomicU64,
    /// Audit records the audit sink failed to accept
    audit_failures: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_evaluated(&self) {
        self.inner.events_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.inner.events_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.inner.evaluation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.warnings_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied(&self) {
        self.inner.warnings_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.inner.entries_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery_failure(&self) {
        self.inner.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_audit_failure(&self) {
        self.inner.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_evaluated(&self) -> u64 {
        self.inner.events_evaluated.load(Ordering::Relaxed)
    }

    pub fn events_skipped(&self) -> u64 {
        self.inner.events_skipped.load(Ordering::Relaxed)
    }

    pub fn evaluation_failures(&self) -> u64 {
        self.inner.evaluation_failures.load(Ordering::Relaxed)
    }

    pub fn warnings_admitted(&self) -> u64 {
        self.inner.warnings_admitted.load(Ordering::Relaxed)
    }

    pub fn warnings_denied(&self) -> u64 {
        self.inner.warnings_denied.load(Ordering::Relaxed)
    }

    pub fn entries_evicted(&self) -> u64 {
        self.inner.entries_evicted.load(Ordering::Relaxed)
    }

    pub fn delivery_failures(&self) -> u64 {
        self.inner.delivery_failures.load(Ordering::Relaxed)
    }

    pub fn audit_failures(&self) -> u64 {
        self.inner.audit_failures.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_evaluated: self.events_evaluated(),
            events_skipped: self.events_skipped(),
            evaluation_failures: self.evaluation_failures(),
            warnings_admitted: self.warnings_admitted(),
            warnings_denied: self.warnings_denied(),
            entries_evicted: self.entries_evicted(),
            delivery_failures: self.delivery_failures(),
            audit_failures: self.audit_failures(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub events_evaluated: u64,
    pub events_skipped: u64,
    pub evaluation_failures: u64,
    pub warnings_admitted: u64,
    pub warnings_denied: u64,
    pub entries_evicted: u64,
    pub delivery_failures: u64,
    pub audit_failures: u64,
}

impl MetricsSnapshot {
    /// Share of matched rules that were held back by a cooldown (0.0 to 1.0).
    pub fn denial_rate(&self) -> f64 {
        let total = self.warnings_admitted.saturating_add(self.warnings_denied);
        if total == 0 {
            0.0
        } else {
            self.warnings_denied as f64 / total as f64
        }
    }
}
