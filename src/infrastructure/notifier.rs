//! Warning delivery adapters.

use crate::application::ports::{DeliveryError, Notifier};
use crate::domain::decision::MessageKey;
use crate::domain::identity::Identity;
use crate::infrastructure::settings::MessageTemplates;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const POST_EPHEMERAL_URL: &str = "https://slack.com/api/chat.postEphemeral";

/// Posts warnings through the Slack Web API.
pub struct SlackNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    templates: MessageTemplates,
}

impl SlackNotifier {
    pub fn new(token: String, templates: MessageTemplates) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: POST_EPHEMERAL_URL.to_string(),
            token,
            templates,
        }
    }

    /// Point the notifier at another API endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct PostEphemeral<'a> {
    channel: &'a str,
    user: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post_ephemeral_warning(
        &self,
        channel: &Identity,
        user: &Identity,
        key: MessageKey,
    ) -> Result<(), DeliveryError> {
        let payload = PostEphemeral {
            channel: channel.as_str(),
            user: user.as_str(),
            text: self.templates.text_for(key),
        };

        let response: ApiResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Notification(e.to_string()))?
            .error_for_status()
            .map_err(|e| DeliveryError::Notification(e.to_string()))?
            .json()
            .await
            .map_err(|e| DeliveryError::Notification(e.to_string()))?;

        if response.ok {
            Ok(())
        } else {
            Err(DeliveryError::Notification(
                response.error.unwrap_or_else(|| "unknown api error".into()),
            ))
        }
    }
}

/// Prints warnings to stdout instead of posting them.
pub struct ConsoleNotifier {
    templates: MessageTemplates,
}

impl ConsoleNotifier {
    pub fn new(templates: MessageTemplates) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn post_ephemeral_warning(
        &self,
        channel: &Identity,
        user: &Identity,
        key: MessageKey,
    ) -> Result<(), DeliveryError> {
        println!(
            "WARN: rule={} channel={} user={} text={}",
            key,
            channel,
            user,
            self.templates.text_for(key)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = PostEphemeral {
            channel: "C1",
            user: "U1",
            text: "please mention someone",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["channel"], "C1");
        assert_eq!(json["user"], "U1");
        assert_eq!(json["text"], "please mention someone");
    }

    #[test]
    fn test_api_error_response() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"ok":false,"error":"user_not_in_channel"}"#).unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("user_not_in_channel"));

        let response: ApiResponse = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(response.ok);
    }

    #[tokio::test]
    async fn test_console_notifier_always_succeeds() {
        let notifier = ConsoleNotifier::new(MessageTemplates::default());
        let result = notifier
            .post_ephemeral_warning(&"C1".into(), &"U1".into(), MessageKey::Flood)
            .await;
        assert!(result.is_ok());
    }
}
