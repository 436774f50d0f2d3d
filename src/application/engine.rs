//! Rule evaluation for one inbound event.
//!
//! The engine runs the shared preconditions, then the enabled rules in fixed
//! order (`no_mention`, `non_thread_reply`, `flood`). A matching rule asks the
//! cooldown tracker for a combined user + channel admission; only an
//! admitted decision should produce a warning.
//!
//! A `no_mention` match ends evaluation for the event even when its
//! admission was denied. The other rules never stop evaluation.

use crate::application::cooldown::{CooldownState, CooldownTracker};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, Storage, TextClassifier};
use crate::application::window_store::WindowStore;
use crate::domain::decision::{EventOutcome, RuleDecision, RuleName, SkipReason};
use crate::domain::event::MessageEvent;
use crate::domain::identity::{ActivityKey, CooldownKey, Identity};
use crate::domain::window::{duration_millis, ActivityWindow};
use serde::Deserialize;
use std::any::Any;
use std::cell::Cell;
use std::collections::HashSet;
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// How the channel list is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Only listed channels are moderated
    Include,
    /// Every channel except the listed ones is moderated
    #[default]
    Exclude,
}

/// Per-rule on/off switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RuleToggles {
    pub no_mention: bool,
    pub non_thread_reply: bool,
    pub flood: bool,
}

impl RuleToggles {
    pub fn all() -> Self {
        Self {
            no_mention: true,
            non_thread_reply: true,
            flood: true,
        }
    }

    pub fn none() -> Self {
        Self {
            no_mention: false,
            non_thread_reply: false,
            flood: false,
        }
    }

    pub fn is_enabled(&self, rule: RuleName) -> bool {
        match rule {
            RuleName::NoMention => self.no_mention,
            RuleName::NonThreadReply => self.non_thread_reply,
            RuleName::Flood => self.flood,
        }
    }
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self::all()
    }
}

/// Validated engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: MonitorMode,
    pub channels: HashSet<Identity>,
    pub rules: RuleToggles,
    pub user_cooldown: Duration,
    pub channel_cooldown: Duration,
    pub flood_window: Duration,
    /// Activity count at which the flood rule matches (at least 1)
    pub flood_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: MonitorMode::Exclude,
            channels: HashSet::new(),
            rules: RuleToggles::all(),
            user_cooldown: Duration::from_secs(300),
            channel_cooldown: Duration::from_secs(60),
            flood_window: Duration::from_secs(60),
            flood_threshold: 5,
        }
    }
}

impl EngineConfig {
    /// Whether events from `channel` are moderated. An empty channel never is.
    pub fn is_monitored(&self, channel: &Identity) -> bool {
        if channel.is_empty() {
            return false;
        }
        match self.mode {
            MonitorMode::Include => self.channels.contains(channel),
            MonitorMode::Exclude => !self.channels.contains(channel),
        }
    }
}

/// Moderation engine owning cooldown and activity state.
///
/// Generic over the two storage backends; production code uses the
/// `ModerationEngine` alias assembled by `RuleEngineBuilder`.
pub struct RuleEngine<C, A>
where
    C: Storage<CooldownKey, CooldownState> + Clone,
    A: Storage<ActivityKey, ActivityWindow> + Clone,
{
    config: EngineConfig,
    cooldowns: Arc<CooldownTracker<C>>,
    windows: WindowStore<A>,
    classifier: Arc<dyn TextClassifier>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl<C, A> RuleEngine<C, A>
where
    C: Storage<CooldownKey, CooldownState> + Clone,
    A: Storage<ActivityKey, ActivityWindow> + Clone,
{
    pub fn new(
        config: EngineConfig,
        cooldowns: Arc<CooldownTracker<C>>,
        windows: WindowStore<A>,
        classifier: Arc<dyn TextClassifier>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            cooldowns,
            windows,
            classifier,
            clock,
            metrics,
        }
    }

    /// Evaluate one event.
    ///
    /// Never panics: a fault inside rule evaluation is caught and reported
    /// as [`EventOutcome::Failed`]. Rules that ran before the fault keep
    /// their state changes; other keys are untouched.
    pub fn evaluate(&self, event: &MessageEvent) -> EventOutcome {
        if let Some(reason) = self.skip_reason(event) {
            debug!(
                user = %event.user,
                channel = %event.channel,
                ts = %event.ts,
                %reason,
                "event skipped"
            );
            self.metrics.record_skipped();
            return EventOutcome::Skipped(reason);
        }

        let result = {
            let _scope = EvaluationScope::enter();
            panic::catch_unwind(panic::AssertUnwindSafe(|| self.run_rules(event)))
        };

        match result {
            Ok(decisions) => {
                self.metrics.record_evaluated();
                EventOutcome::Evaluated(decisions)
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(
                    user = %event.user,
                    channel = %event.channel,
                    ts = %event.ts,
                    error = %reason,
                    "rule evaluation failed"
                );
                self.metrics.record_failure();
                EventOutcome::Failed(reason)
            }
        }
    }

    fn skip_reason(&self, event: &MessageEvent) -> Option<SkipReason> {
        if event.is_bot_or_subtype() {
            Some(SkipReason::BotOrSubtype)
        } else if event.is_threaded_reply() {
            Some(SkipReason::ThreadedReply)
        } else if !self.config.is_monitored(&event.channel) {
            Some(SkipReason::UnmonitoredChannel)
        } else if event.user.is_empty() {
            Some(SkipReason::MissingUser)
        } else {
            None
        }
    }

    fn run_rules(&self, event: &MessageEvent) -> Vec<RuleDecision> {
        let mut decisions = Vec::with_capacity(RuleName::ORDER.len());
        for rule in RuleName::ORDER {
            if !self.config.rules.is_enabled(rule) {
                continue;
            }
            let decision = self.evaluate_rule(rule, event);
            let stop = decision.matched && rule.stops_evaluation();
            decisions.push(decision);
            if stop {
                break;
            }
        }
        decisions
    }

    fn evaluate_rule(&self, rule: RuleName, event: &MessageEvent) -> RuleDecision {
        let mut count = None;
        let matched = match rule {
            RuleName::NoMention => !self.classifier.contains_user_mention(&event.text),
            RuleName::NonThreadReply => self.classifier.looks_like_reply(&event.text),
            RuleName::Flood => {
                let key = ActivityKey::new(event.user.clone(), event.channel.clone());
                let recent = self.windows.record(key, self.clock.now_millis());
                debug!(
                    user = %event.user,
                    channel = %event.channel,
                    count = recent,
                    window_ms = duration_millis(self.windows.window()),
                    "recent activity counted"
                );
                count = Some(recent);
                recent >= self.config.flood_threshold
            }
        };

        if !matched {
            return RuleDecision::unmatched(rule);
        }

        let gates = self.cooldowns.admit_pair(
            &event.user,
            &event.channel,
            self.config.user_cooldown,
            self.config.channel_cooldown,
        );
        let mut decision = RuleDecision::matched(rule, gates);
        if let Some(count) = count {
            decision = decision.with_extra("count", count as u64);
        }

        if decision.admitted {
            self.metrics.record_admitted();
            debug!(%rule, user = %event.user, channel = %event.channel, "warning admitted");
        } else {
            self.metrics.record_denied();
            debug!(
                %rule,
                user = %event.user,
                channel = %event.channel,
                cooldown_user = !gates.user,
                cooldown_channel = !gates.channel,
                "rule matched but on cooldown"
            );
        }
        decision
    }

    /// Expire stale activity and drop idle `(user, channel)` pairs.
    pub fn sweep_windows(&self) {
        self.windows.sweep(self.clock.now_millis());
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker<C>> {
        &self.cooldowns
    }

    pub fn windows(&self) -> &WindowStore<A> {
        &self.windows
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

thread_local! {
    static EVALUATING: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside [`RuleEngine::evaluate`] rule code.
///
/// Panics raised while this is `true` are caught and turned into
/// [`EventOutcome::Failed`]. A process-wide panic hook can use it to tell
/// those apart from panics that will actually unwind the caller.
pub fn is_evaluating() -> bool {
    EVALUATING.with(Cell::get)
}

struct EvaluationScope {
    previous: bool,
}

impl EvaluationScope {
    fn enter() -> Self {
        Self {
            previous: EVALUATING.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for EvaluationScope {
    fn drop(&mut self) {
        EVALUATING.with(|flag| flag.set(self.previous));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
