//! # slack-patrol
//!
//! Moderation engine for team chat channels.
//!
//! Every top-level post in a monitored channel runs through three rules, in
//! order:
//!
//! 1. **`no_mention`**: the post addresses nobody (`<@U…>` is missing).
//! 2. **`non_thread_reply`**: the post looks like a reply (`re:`) but was
//!    written at channel level instead of in the thread.
//! 3. **`flood`**: the user has posted in this channel at least
//!    `flood_max_posts` times within `flood_window_sec`.
//!
//! A matched rule only produces a warning when **both** cooldown gates allow
//! it: one per user, one per channel. Gates are independent, so a gate that
//! grants records the new timestamp even when the other gate denies.
//! A `no_mention` match ends evaluation for the event whatever the gates say.
//!
//! ## Quick Start
//!
//! ```rust
//! use slack_patrol::{MessageEvent, RuleEngineBuilder, RuleName};
//! use std::time::Duration;
//!
//! let engine = RuleEngineBuilder::new()
//!     .with_user_cooldown(Duration::from_secs(300))
//!     .with_channel_cooldown(Duration::from_secs(60))
//!     .build()
//!     .unwrap();
//!
//! let outcome = engine.evaluate(&MessageEvent::new("U123", "C1", "anyone around?"));
//! let warned: Vec<_> = outcome.warnings().map(|d| d.rule).collect();
//! assert_eq!(warned, vec![RuleName::NoMention]);
//!
//! // Both gates are now closed for this user and channel
//! let again = engine.evaluate(&MessageEvent::new("U123", "C1", "hello?"));
//! assert_eq!(again.warnings().count(), 0);
//! ```
//!
//! ## Delivery
//!
//! [`Moderator`] wraps the engine with a [`Notifier`] for the ephemeral
//! warning and an [`AuditSink`] for the audit log. The audit row is only
//! written after the warning was posted. Delivery failures are logged and
//! counted in [`Metrics`]; they never undo a cooldown.
//!
//! ```rust,no_run
//! use slack_patrol::{
//!     MessageEvent, MessageTemplates, Moderator, NoopAuditSink, RuleEngineBuilder, SlackNotifier,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let engine = Arc::new(RuleEngineBuilder::new().build().unwrap());
//! let notifier = SlackNotifier::new("xoxb-token".to_string(), MessageTemplates::default());
//! let moderator = Moderator::new(engine, Arc::new(notifier), Arc::new(NoopAuditSink));
//!
//! moderator.handle(&MessageEvent::new("U123", "C1", "anyone around?")).await;
//! # }
//! ```
//!
//! ## Persistence
//!
//! Cooldown timestamps survive restarts through a [`CooldownStore`]. The
//! [`PersistenceWorker`] watches the tracker's mutation signal and writes a
//! full snapshot at most once per coalescing delay (50ms by default).
//! Activity windows are not persisted.
//!
//! ```rust,no_run
//! use slack_patrol::{
//!     CooldownFile, CooldownStore, FlushConfig, PersistenceWorker, RuleEngineBuilder,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RuleEngineBuilder::new().build()?;
//! let file = Arc::new(CooldownFile::new("cooldown_state.csv"));
//!
//! engine.cooldowns().restore(file.load()?);
//! let flush = PersistenceWorker::spawn(
//!     Arc::clone(engine.cooldowns()),
//!     file,
//!     FlushConfig::default(),
//! );
//!
//! // ... handle events ...
//!
//! flush.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Memory Management
//!
//! Cooldown and activity maps are each bounded to 10,000 keys by default.
//! When full, the least recently touched key is evicted; an evicted cooldown
//! reads as "never warned". Use [`RuleEngineBuilder::with_max_entries`] to
//! change the bound, and watch [`Metrics::entries_evicted`] for pressure.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    decision::{Admission, EventOutcome, MessageKey, RuleDecision, RuleName, SkipReason},
    event::MessageEvent,
    identity::{ActivityKey, CooldownEntry, CooldownKey, CooldownKind, Identity},
    window::ActivityWindow,
};

pub use application::{
    cooldown::{CooldownState, CooldownTracker},
    engine::{is_evaluating, EngineConfig, MonitorMode, RuleEngine, RuleToggles},
    metrics::{Metrics, MetricsSnapshot},
    moderator::Moderator,
    persistence::{
        persist_snapshot, FlushConfig, FlushError, FlushHandle, MutationSignal, PersistenceWorker,
    },
    ports::{
        AuditRecord, AuditSink, Clock, CooldownStore, DeliveryError, EvictionCandidate,
        EvictionPolicy, Notifier, PersistenceError, Storage, TextClassifier,
    },
    window_store::WindowStore,
};

pub use infrastructure::{
    audit::{NoopAuditSink, WebhookAuditSink},
    builder::{BuildError, ModerationEngine, RuleEngineBuilder},
    classifier::LexicalClassifier,
    clock::SystemClock,
    cooldown_file::CooldownFile,
    eviction::LruEviction,
    notifier::{ConsoleNotifier, SlackNotifier},
    settings::{ConfigError, Environment, MessageTemplates, Settings},
    storage::ShardedStorage,
};
