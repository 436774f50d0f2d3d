//! Identities and the keys derived from them.
//!
//! An identity is an opaque token naming a user or a channel. It has no
//! structure beyond equality, so it is stored as a shared `Arc<str>` and
//! cloned freely into map keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque user or channel identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(Arc<str>);

impl Identity {
    /// Create an identity from any string-like value.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty token, which the transport uses for "absent".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self(Arc::from(""))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0.to_string()
    }
}

/// Which cooldown table an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CooldownKind {
    User,
    Channel,
}

impl CooldownKind {
    /// Name used in the persisted table.
    pub fn as_str(&self) -> &'static str {
        match self {
            CooldownKind::User => "user",
            CooldownKind::Channel => "channel",
        }
    }

    /// Parse the persisted name. Unknown kinds yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(CooldownKind::User),
            "channel" => Some(CooldownKind::Channel),
            _ => None,
        }
    }
}

impl fmt::Display for CooldownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of the cooldown map: at most one entry per `(kind, identity)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CooldownKey {
    pub kind: CooldownKind,
    pub identity: Identity,
}

impl CooldownKey {
    pub fn new(kind: CooldownKind, identity: Identity) -> Self {
        Self { kind, identity }
    }

    pub fn user(identity: impl Into<Identity>) -> Self {
        Self::new(CooldownKind::User, identity.into())
    }

    pub fn channel(identity: impl Into<Identity>) -> Self {
        Self::new(CooldownKind::Channel, identity.into())
    }
}

/// A persisted "last warned at" record.
///
/// `last_warned_at` is wall-clock time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownEntry {
    pub kind: CooldownKind,
    pub identity: Identity,
    pub last_warned_at: u64,
}

impl CooldownEntry {
    pub fn new(kind: CooldownKind, identity: impl Into<Identity>, last_warned_at: u64) -> Self {
        Self {
            kind,
            identity: identity.into(),
            last_warned_at,
        }
    }

    pub fn key(&self) -> CooldownKey {
        CooldownKey::new(self.kind, self.identity.clone())
    }
}

/// Key of the flood-detection map: one activity window per `(user, channel)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityKey {
    pub user: Identity,
    pub channel: Identity,
}

impl ActivityKey {
    pub fn new(user: impl Into<Identity>, channel: impl Into<Identity>) -> Self {
        Self {
            user: user.into(),
            channel: channel.into(),
        }
    }
}
