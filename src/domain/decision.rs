//! Rule names, per-rule decisions and per-event outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The moderation rules, in evaluation order.
///
/// A rule name doubles as the message key handed to the notification
/// collaborator: each rule has exactly one warning template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleName {
    NoMention,
    NonThreadReply,
    Flood,
}

/// Message key passed to notifiers.
pub type MessageKey = RuleName;

impl RuleName {
    /// Fixed evaluation order.
    pub const ORDER: [RuleName; 3] = [
        RuleName::NoMention,
        RuleName::NonThreadReply,
        RuleName::Flood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleName::NoMention => "no_mention",
            RuleName::NonThreadReply => "non_thread_reply",
            RuleName::Flood => "flood",
        }
    }

    /// Whether a match of this rule ends evaluation for the event,
    /// whatever the cooldown gates decide.
    pub fn stops_evaluation(&self) -> bool {
        matches!(self, RuleName::NoMention)
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of consulting the per-user and per-channel cooldown gates.
///
/// A gate that granted has already recorded the new timestamp, even when the
/// other gate denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub user: bool,
    pub channel: bool,
}

impl Admission {
    pub fn granted(&self) -> bool {
        self.user && self.channel
    }

    /// At least one gate recorded a new timestamp.
    pub fn mutated(&self) -> bool {
        self.user || self.channel
    }
}

/// Decision for one rule on one event.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecision {
    pub rule: RuleName,
    pub matched: bool,
    /// True only when both cooldown gates granted.
    pub admitted: bool,
    /// Gate results; `None` when the rule did not match.
    pub gates: Option<Admission>,
    /// Extra fields for the audit record (e.g. the flood count).
    pub audit_extra: BTreeMap<String, Value>,
}

impl RuleDecision {
    pub fn unmatched(rule: RuleName) -> Self {
        Self {
            rule,
            matched: false,
            admitted: false,
            gates: None,
            audit_extra: BTreeMap::new(),
        }
    }

    pub fn matched(rule: RuleName, gates: Admission) -> Self {
        Self {
            rule,
            matched: true,
            admitted: gates.granted(),
            gates: Some(gates),
            audit_extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.audit_extra.insert(key.into(), value.into());
        self
    }

    pub fn message_key(&self) -> MessageKey {
        self.rule
    }
}

/// Why an event was not evaluated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Bot post or a message with a subtype.
    BotOrSubtype,
    /// Reply inside a thread.
    ThreadedReply,
    /// Channel excluded by the monitoring mode.
    UnmonitoredChannel,
    /// No user identity on the event.
    MissingUser,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::BotOrSubtype => "bot or subtype post",
            SkipReason::ThreadedReply => "threaded reply",
            SkipReason::UnmonitoredChannel => "channel not monitored",
            SkipReason::MissingUser => "missing user",
        };
        f.write_str(reason)
    }
}

/// Outcome of evaluating one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Skipped(SkipReason),
    /// Decisions for every rule that was reached, in evaluation order.
    Evaluated(Vec<RuleDecision>),
    /// Evaluation aborted; state for other keys is untouched.
    Failed(String),
}

impl EventOutcome {
    /// Decisions that should produce a warning.
    pub fn warnings(&self) -> impl Iterator<Item = &RuleDecision> {
        let decisions: &[RuleDecision] = match self {
            EventOutcome::Evaluated(decisions) => decisions,
            _ => &[],
        };
        decisions.iter().filter(|decision| decision.admitted)
    }

    pub fn decision(&self, rule: RuleName) -> Option<&RuleDecision> {
        match self {
            EventOutcome::Evaluated(decisions) => decisions.iter().find(|d| d.rule == rule),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, EventOutcome::Skipped(_))
    }
}
