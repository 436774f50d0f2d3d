//! Audit log adapters.

use crate::application::ports::{AuditRecord, AuditSink, DeliveryError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Request timeout for audit posts.
pub const AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts audit records as JSON to a webhook (a spreadsheet endpoint, typically).
pub struct WebhookAuditSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAuditSink {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(AUDIT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, url }
    }
}

#[async_trait]
impl AuditSink for WebhookAuditSink {
    async fn record_event(&self, record: AuditRecord) -> Result<(), DeliveryError> {
        self.client
            .post(&self.url)
            .json(&record)
            .send()
            .await
            .map_err(|e| DeliveryError::Audit(e.to_string()))?
            .error_for_status()
            .map_err(|e| DeliveryError::Audit(e.to_string()))?;

        debug!(
            rule = %record.rule,
            user = %record.user,
            channel = %record.channel,
            "audit record sent"
        );
        Ok(())
    }
}

/// Used when no audit endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record_event(&self, record: AuditRecord) -> Result<(), DeliveryError> {
        debug!(rule = %record.rule, "no audit endpoint configured; record dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::RuleName;
    use crate::domain::event::MessageEvent;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_noop_sink_accepts_everything() {
        let event = MessageEvent::new("U1", "C1", "text");
        let record = AuditRecord::new(RuleName::NoMention, &event, BTreeMap::new(), "t".into());
        assert!(NoopAuditSink.record_event(record).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_an_audit_error() {
        let sink = WebhookAuditSink::new("http://127.0.0.1:9/audit".to_string());
        let event = MessageEvent::new("U1", "C1", "text");
        let record = AuditRecord::new(RuleName::Flood, &event, BTreeMap::new(), "t".into());

        assert!(matches!(sink.record_event(record).await, Err(DeliveryError::Audit(_))));
    }
}
