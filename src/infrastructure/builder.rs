//! Assembly of a production [`RuleEngine`].
//!
//! The builder picks the concrete adapters: sharded in-memory storage with
//! LRU bounds, the system clock and the regex classifier. Tests swap the
//! clock or classifier through the `with_*` methods.

use crate::application::cooldown::{CooldownState, CooldownTracker};
use crate::application::engine::{EngineConfig, MonitorMode, RuleEngine, RuleToggles};
use crate::application::metrics::Metrics;
use crate::application::persistence::MutationSignal;
use crate::application::ports::{Clock, TextClassifier};
use crate::application::window_store::WindowStore;
use crate::domain::identity::{ActivityKey, CooldownKey, Identity};
use crate::domain::window::{ensure_window, ActivityWindow};
use crate::infrastructure::classifier::LexicalClassifier;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::eviction::LruEviction;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use std::time::Duration;

/// Default ceiling on tracked keys, per map.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Shared cooldown map.
pub type CooldownStorage = Arc<ShardedStorage<CooldownKey, CooldownState>>;
/// Shared activity-window map.
pub type ActivityStorage = Arc<ShardedStorage<ActivityKey, ActivityWindow>>;
/// The engine as assembled by [`RuleEngineBuilder`].
pub type ModerationEngine = RuleEngine<CooldownStorage, ActivityStorage>;

/// Error returned when engine configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Maximum tracked entries must be greater than zero
    ZeroMaxEntries,
    /// Flood threshold must be at least one post
    ZeroFloodThreshold,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ZeroMaxEntries => write!(f, "max_entries must be greater than 0"),
            BuildError::ZeroFloodThreshold => write!(f, "flood threshold must be at least 1"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for [`ModerationEngine`].
pub struct RuleEngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    classifier: Option<Arc<dyn TextClassifier>>,
    max_entries: Option<usize>,
    signal: Option<MutationSignal>,
}

impl Default for RuleEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: None,
            classifier: None,
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            signal: None,
        }
    }

    pub fn with_mode(mut self, mode: MonitorMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the channel list the mode applies to.
    pub fn with_channels<I, T>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identity>,
    {
        self.config.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rules(mut self, rules: RuleToggles) -> Self {
        self.config.rules = rules;
        self
    }

    pub fn with_user_cooldown(mut self, interval: Duration) -> Self {
        self.config.user_cooldown = interval;
        self
    }

    pub fn with_channel_cooldown(mut self, interval: Duration) -> Self {
        self.config.channel_cooldown = interval;
        self
    }

    /// Set the flood window. A zero window falls back to 60 seconds.
    pub fn with_flood_window(mut self, window: Duration) -> Self {
        self.config.flood_window = window;
        self
    }

    /// Set the post count at which the flood rule matches.
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_flood_threshold(mut self, threshold: usize) -> Self {
        self.config.flood_threshold = threshold;
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TextClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set the maximum number of keys tracked in each map.
    ///
    /// When the limit is reached the least recently touched key is evicted.
    /// An evicted cooldown reads as "never warned".
    ///
    /// Default: 10,000 keys
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Disable the key limit, allowing unbounded growth.
    pub fn with_unlimited_entries(mut self) -> Self {
        self.max_entries = None;
        self
    }

    /// Share a mutation signal with the cooldown tracker.
    pub fn with_mutation_signal(mut self, signal: MutationSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<ModerationEngine, BuildError> {
        if self.max_entries == Some(0) {
            return Err(BuildError::ZeroMaxEntries);
        }
        if self.config.flood_threshold == 0 {
            return Err(BuildError::ZeroFloodThreshold);
        }

        let mut config = self.config;
        config.flood_window = ensure_window(config.flood_window);

        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        let mut cooldown_storage: ShardedStorage<CooldownKey, CooldownState> =
            ShardedStorage::new()
                .with_clock(Arc::clone(&clock))
                .with_metrics(metrics.clone());
        let mut activity_storage: ShardedStorage<ActivityKey, ActivityWindow> =
            ShardedStorage::new()
                .with_clock(Arc::clone(&clock))
                .with_metrics(metrics.clone());
        if let Some(max) = self.max_entries {
            let lru = Arc::new(LruEviction::new(max));
            cooldown_storage = cooldown_storage.with_eviction_policy(lru.clone());
            activity_storage = activity_storage.with_eviction_policy(lru);
        }

        let mut tracker = CooldownTracker::new(Arc::new(cooldown_storage), Arc::clone(&clock));
        if let Some(signal) = self.signal {
            tracker = tracker.with_signal(signal);
        }
        let windows = WindowStore::new(Arc::new(activity_storage), config.flood_window);
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(LexicalClassifier::new()));

        Ok(RuleEngine::new(
            config,
            Arc::new(tracker),
            windows,
            classifier,
            clock,
            metrics,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::RuleName;
    use crate::domain::event::MessageEvent;
    use crate::infrastructure::mocks::MockClock;

    #[test]
    fn test_build_validation() {
        assert_eq!(
            RuleEngineBuilder::new().with_max_entries(0).build().err(),
            Some(BuildError::ZeroMaxEntries)
        );
        assert_eq!(
            RuleEngineBuilder::new().with_flood_threshold(0).build().err(),
            Some(BuildError::ZeroFloodThreshold)
        );
        assert!(RuleEngineBuilder::new().with_unlimited_entries().build().is_ok());
    }

    #[test]
    fn test_zero_window_falls_back() {
        let engine = RuleEngineBuilder::new()
            .with_flood_window(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(engine.config().flood_window, Duration::from_secs(60));
        assert_eq!(engine.windows().window(), Duration::from_secs(60));
    }

    #[test]
    fn test_max_entries_bounds_both_maps() {
        let clock = MockClock::new(0);
        let engine = RuleEngineBuilder::new()
            .with_clock(Arc::new(clock.clone()))
            .with_rules(RuleToggles {
                flood: true,
                ..RuleToggles::none()
            })
            .with_flood_threshold(1)
            .with_max_entries(4)
            .build()
            .unwrap();

        for i in 0..20 {
            clock.advance(Duration::from_millis(1));
            let outcome = engine.evaluate(&MessageEvent::new(format!("U{}", i), "C1", "x"));
            assert!(outcome.decision(RuleName::Flood).is_some());
        }

        assert!(engine.windows().len() <= 4);
        assert!(engine.cooldowns().len() <= 4);
        assert!(engine.metrics().entries_evicted() > 0);
    }

    #[test]
    fn test_shared_signal() {
        let signal = MutationSignal::new();
        let engine = RuleEngineBuilder::new()
            .with_mutation_signal(signal.clone())
            .build()
            .unwrap();

        engine.evaluate(&MessageEvent::new("U1", "C1", "no mention here"));
        assert!(signal.is_dirty());
    }
}
