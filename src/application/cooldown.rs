//! Per-user and per-channel warning cooldowns.
//!
//! The tracker stores one "last warned at" timestamp per `(kind, identity)`.
//! Admission is a compare-and-set performed inside the storage's per-key
//! lock: two callers racing on the same key can never both be granted
//! within one interval.

use crate::application::persistence::MutationSignal;
use crate::application::ports::{Clock, Storage};
use crate::domain::decision::Admission;
use crate::domain::identity::{CooldownEntry, CooldownKey, CooldownKind, Identity};
use crate::domain::window::duration_millis;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Cooldown state for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownState {
    /// Epoch millis of the last granted warning; `None` means never.
    last_warned_at: Option<u64>,
}

impl CooldownState {
    pub fn new(last_warned_at: u64) -> Self {
        Self {
            last_warned_at: Some(last_warned_at),
        }
    }

    pub fn last_warned_at(&self) -> Option<u64> {
        self.last_warned_at
    }

    /// Grant if at least `interval_ms` has passed since the last grant, and
    /// record `now` when granting. A denial leaves the state untouched.
    ///
    /// The stored value never moves backwards, even if the clock does.
    fn try_admit(&mut self, now: u64, interval_ms: u64) -> bool {
        if let Some(last) = self.last_warned_at {
            if now.saturating_sub(last) < interval_ms {
                return false;
            }
        }
        self.last_warned_at = Some(self.last_warned_at.map_or(now, |last| last.max(now)));
        true
    }

    fn merge(&mut self, last_warned_at: u64) {
        self.last_warned_at = Some(
            self.last_warned_at
                .map_or(last_warned_at, |last| last.max(last_warned_at)),
        );
    }
}

/// Cooldown gates shared by every rule.
///
/// Every grant marks the tracker dirty through its [`MutationSignal`], which
/// a [`PersistenceWorker`](crate::application::persistence::PersistenceWorker)
/// turns into a debounced save.
#[derive(Debug, Clone)]
pub struct CooldownTracker<S>
where
    S: Storage<CooldownKey, CooldownState> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    signal: MutationSignal,
}

impl<S> CooldownTracker<S>
where
    S: Storage<CooldownKey, CooldownState> + Clone,
{
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            signal: MutationSignal::new(),
        }
    }

    /// Share an existing signal instead of creating a fresh one.
    pub fn with_signal(mut self, signal: MutationSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Signal fired whenever a gate grants.
    pub fn signal(&self) -> &MutationSignal {
        &self.signal
    }

    /// Single gate: grant and record now, or deny without mutation.
    pub fn try_admit(&self, kind: CooldownKind, identity: &Identity, interval: Duration) -> bool {
        let granted = self.admit_unsignalled(kind, identity, interval);
        if granted {
            self.signal.mark_dirty();
        }
        granted
    }

    /// Consult the user gate, then the channel gate.
    ///
    /// Both gates are always consulted. A gate that grants keeps its new
    /// timestamp even when the other gate denies.
    pub fn admit_pair(
        &self,
        user: &Identity,
        channel: &Identity,
        user_interval: Duration,
        channel_interval: Duration,
    ) -> Admission {
        let admission = Admission {
            user: self.admit_unsignalled(CooldownKind::User, user, user_interval),
            channel: self.admit_unsignalled(CooldownKind::Channel, channel, channel_interval),
        };
        if admission.mutated() {
            self.signal.mark_dirty();
        }
        admission
    }

    fn admit_unsignalled(
        &self,
        kind: CooldownKind,
        identity: &Identity,
        interval: Duration,
    ) -> bool {
        let now = self.clock.now_millis();
        let interval_ms = duration_millis(interval);
        let granted = self.storage.with_entry_mut(
            CooldownKey::new(kind, identity.clone()),
            CooldownState::default,
            |state| state.try_admit(now, interval_ms),
        );
        trace!(%kind, identity = %identity, granted, "cooldown gate");
        granted
    }

    /// Last grant time for a key, if it was ever granted.
    pub fn last_warned_at(&self, kind: CooldownKind, identity: &Identity) -> Option<u64> {
        self.storage
            .with_entry(&CooldownKey::new(kind, identity.clone()), |state| {
                state.last_warned_at()
            })
            .flatten()
    }

    /// Every recorded entry, user rows first, each kind sorted by identity.
    pub fn snapshot(&self) -> Vec<CooldownEntry> {
        let mut entries = Vec::with_capacity(self.storage.len());
        self.storage.for_each(|key, state| {
            if let Some(last) = state.last_warned_at() {
                entries.push(CooldownEntry::new(key.kind, key.identity.clone(), last));
            }
        });
        entries.sort_by(|a, b| (a.kind, &a.identity).cmp(&(b.kind, &b.identity)));
        entries
    }

    /// Seed the tracker with persisted entries. Returns how many were applied.
    ///
    /// Existing newer timestamps win. Restoring does not mark the tracker dirty.
    pub fn restore<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = CooldownEntry>,
    {
        let mut applied = 0;
        for entry in entries {
            let last = entry.last_warned_at;
            self.storage
                .with_entry_mut(entry.key(), CooldownState::default, |state| state.merge(last));
            applied += 1;
        }
        applied
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}
