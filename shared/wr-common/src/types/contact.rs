//! Contact and Chat Types

use serde::{Deserialize, Serialize};

/// Contact as delivered by the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    /// Name saved in the address book of the paired phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name the contact chose for themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
    /// Verified business name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_name: Option<String>,
}

impl Contact {
    /// Display name, preferring the push name over the verified name.
    pub fn display_name(&self) -> Option<&str> {
        fn named(n: &Option<String>) -> Option<&str> {
            n.as_deref().filter(|n| !n.is_empty())
        }
        named(&self.notify).or_else(|| named(&self.verified_name))
    }
}

/// Chat as delivered by the connection. Only the id is tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
}

/// Presence update for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub id: String,
    /// Per-participant presence payload, passed through untouched.
    #[serde(default)]
    pub presences: serde_json::Value,
}

/// Presence announced to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Unavailable,
    Available,
    Composing,
    Recording,
    Paused,
}

impl Presence {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Available => "available",
            Self::Composing => "composing",
            Self::Recording => "recording",
            Self::Paused => "paused",
        }
    }
}
