//! Inbound message events.

use crate::domain::identity::Identity;
use serde::{Deserialize, Serialize};

/// A chat message as delivered by the transport.
///
/// Only the fields the rules look at are modelled; anything else the
/// platform sends is ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: Identity,
    #[serde(default)]
    pub channel: Identity,
    /// Platform timestamp of the message, passed through to audit records.
    #[serde(default)]
    pub ts: String,
    /// Parent thread reference; present only on threaded replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Message subtype (edits, joins, ...). Present means "not a plain post".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// A plain top-level post.
    pub fn new(
        user: impl Into<Identity>,
        channel: impl Into<Identity>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            user: user.into(),
            channel: channel.into(),
            ..Self::default()
        }
    }

    pub fn with_ts(mut self, ts: impl Into<String>) -> Self {
        self.ts = ts.into();
        self
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn from_bot(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    /// System or bot originated posts are never moderated.
    pub fn is_bot_or_subtype(&self) -> bool {
        is_present(&self.subtype) || is_present(&self.bot_id)
    }

    pub fn is_threaded_reply(&self) -> bool {
        is_present(&self.thread_ts)
    }
}

fn is_present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_platform_payload() {
        let raw = r#"{
            "type": "message",
            "user": "U123",
            "channel": "C1",
            "text": "hello",
            "ts": "1714521600.000100",
            "team": "T9"
        }"#;
        let event: MessageEvent = serde_json::from_str(raw).unwrap();

        assert_eq!(event.user.as_str(), "U123");
        assert_eq!(event.channel.as_str(), "C1");
        assert_eq!(event.ts, "1714521600.000100");
        assert!(!event.is_bot_or_subtype());
        assert!(!event.is_threaded_reply());
    }

    #[test]
    fn test_markers() {
        let base = MessageEvent::new("U1", "C1", "hi");
        assert!(base.clone().in_thread("1.0").is_threaded_reply());
        assert!(base.clone().with_subtype("channel_join").is_bot_or_subtype());
        assert!(base.clone().from_bot("B1").is_bot_or_subtype());
        assert!(!base.in_thread("").is_threaded_reply());
    }

    #[test]
    fn test_missing_text_defaults_to_empty() {
        let event: MessageEvent = serde_json::from_str(r#"{"user":"U1","channel":"C1"}"#).unwrap();
        assert_eq!(event.text, "");
    }
}
