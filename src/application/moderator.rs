//! Delivery of admitted warnings.
//!
//! The moderator runs the engine and, for every admitted decision, posts the
//! ephemeral warning and then records the audit row. Delivery failures are
//! logged and counted; they never change a decision already made.

use crate::application::cooldown::CooldownState;
use crate::application::engine::RuleEngine;
use crate::application::ports::{AuditRecord, AuditSink, Notifier, Storage};
use crate::domain::decision::{EventOutcome, RuleDecision};
use crate::domain::event::MessageEvent;
use crate::domain::identity::{ActivityKey, CooldownKey};
use crate::domain::window::ActivityWindow;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Engine plus its outbound collaborators.
pub struct Moderator<C, A>
where
    C: Storage<CooldownKey, CooldownState> + Clone,
    A: Storage<ActivityKey, ActivityWindow> + Clone,
{
    engine: Arc<RuleEngine<C, A>>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl<C, A> Clone for Moderator<C, A>
where
    C: Storage<CooldownKey, CooldownState> + Clone,
    A: Storage<ActivityKey, ActivityWindow> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            notifier: Arc::clone(&self.notifier),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<C, A> Moderator<C, A>
where
    C: Storage<CooldownKey, CooldownState> + Clone,
    A: Storage<ActivityKey, ActivityWindow> + Clone,
{
    pub fn new(
        engine: Arc<RuleEngine<C, A>>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine,
            notifier,
            audit,
        }
    }

    /// Evaluate `event` and deliver its warnings.
    ///
    /// Returns the engine's outcome unchanged, whatever happened to delivery.
    pub async fn handle(&self, event: &MessageEvent) -> EventOutcome {
        let outcome = self.engine.evaluate(event);
        for decision in outcome.warnings() {
            self.deliver(event, decision).await;
        }
        outcome
    }

    async fn deliver(&self, event: &MessageEvent, decision: &RuleDecision) {
        let rule = decision.rule;
        if let Err(e) = self
            .notifier
            .post_ephemeral_warning(&event.channel, &event.user, decision.message_key())
            .await
        {
            self.engine.metrics().record_delivery_failure();
            warn!(
                %rule,
                user = %event.user,
                channel = %event.channel,
                error = %e,
                "warning not delivered"
            );
            return;
        }

        match decision.audit_extra.get("count") {
            Some(count) => info!(
                %rule,
                user = %event.user,
                channel = %event.channel,
                ts = %event.ts,
                %count,
                "warning sent"
            ),
            None => info!(
                %rule,
                user = %event.user,
                channel = %event.channel,
                ts = %event.ts,
                "warning sent"
            ),
        }

        let record = AuditRecord::new(
            rule,
            event,
            decision.audit_extra.clone(),
            self.audit_timestamp(),
        );
        if let Err(e) = self.audit.record_event(record).await {
            self.engine.metrics().record_audit_failure();
            warn!(%rule, error = %e, "audit record not sent");
        }
    }

    fn audit_timestamp(&self) -> String {
        let millis = i64::try_from(self.engine.clock().now_millis()).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn engine(&self) -> &Arc<RuleEngine<C, A>> {
        &self.engine
    }
}
