//! Webhook Event Catalog
//!
//! Outward-facing event names and the per-event enable map.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Events republished to webhook sinks.
///
/// The dotted form is what subscribers see in the `event` field; the
/// upper-case key (`QRCODE_UPDATED`) is what configuration toggles use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "status.instance")]
    StatusInstance,
    #[serde(rename = "qrcode.updated")]
    QrcodeUpdated,
    #[serde(rename = "connection.update")]
    ConnectionUpdate,
    #[serde(rename = "chats.set")]
    ChatsSet,
    #[serde(rename = "chats.upsert")]
    ChatsUpsert,
    #[serde(rename = "chats.update")]
    ChatsUpdate,
    #[serde(rename = "contacts.upsert")]
    ContactsUpsert,
    #[serde(rename = "contacts.update")]
    ContactsUpdate,
    #[serde(rename = "messages.set")]
    MessagesSet,
    #[serde(rename = "messages.upsert")]
    MessagesUpsert,
    #[serde(rename = "messages.update")]
    MessagesUpdate,
    #[serde(rename = "presence.update")]
    PresenceUpdate,
    #[serde(rename = "send.message")]
    SendMessage,
}

impl WebhookEvent {
    /// Every event in the catalog.
    pub const ALL: [Self; 13] = [
        Self::StatusInstance,
        Self::QrcodeUpdated,
        Self::ConnectionUpdate,
        Self::ChatsSet,
        Self::ChatsUpsert,
        Self::ChatsUpdate,
        Self::ContactsUpsert,
        Self::ContactsUpdate,
        Self::MessagesSet,
        Self::MessagesUpsert,
        Self::MessagesUpdate,
        Self::PresenceUpdate,
        Self::SendMessage,
    ];

    /// Convert to the dot-separated string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StatusInstance => "status.instance",
            Self::QrcodeUpdated => "qrcode.updated",
            Self::ConnectionUpdate => "connection.update",
            Self::ChatsSet => "chats.set",
            Self::ChatsUpsert => "chats.upsert",
            Self::ChatsUpdate => "chats.update",
            Self::ContactsUpsert => "contacts.upsert",
            Self::ContactsUpdate => "contacts.update",
            Self::MessagesSet => "messages.set",
            Self::MessagesUpsert => "messages.upsert",
            Self::MessagesUpdate => "messages.update",
            Self::PresenceUpdate => "presence.update",
            Self::SendMessage => "send.message",
        }
    }

    /// Configuration key: upper-cased with the dot turned into an underscore.
    pub const fn config_key(&self) -> &'static str {
        match self {
            Self::StatusInstance => "STATUS_INSTANCE",
            Self::QrcodeUpdated => "QRCODE_UPDATED",
            Self::ConnectionUpdate => "CONNECTION_UPDATE",
            Self::ChatsSet => "CHATS_SET",
            Self::ChatsUpsert => "CHATS_UPSERT",
            Self::ChatsUpdate => "CHATS_UPDATE",
            Self::ContactsUpsert => "CONTACTS_UPSERT",
            Self::ContactsUpdate => "CONTACTS_UPDATE",
            Self::MessagesSet => "MESSAGES_SET",
            Self::MessagesUpsert => "MESSAGES_UPSERT",
            Self::MessagesUpdate => "MESSAGES_UPDATE",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::SendMessage => "SEND_MESSAGE",
        }
    }

    /// Parse from the dotted form (e.g., `"messages.upsert"`).
    pub fn parse_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == s)
    }

    /// Parse from a configuration key, normalizing dotted or lower-case input.
    pub fn parse_key(key: &str) -> Option<Self> {
        let key = key.replace('.', "_").to_uppercase();
        Self::ALL.into_iter().find(|e| e.config_key() == key)
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of event types that may be delivered to any sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledEvents(HashSet<WebhookEvent>);

impl EnabledEvents {
    /// No event enabled.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every catalog event enabled.
    pub fn all() -> Self {
        Self(WebhookEvent::ALL.into_iter().collect())
    }

    /// Build from a lookup keyed by [`WebhookEvent::config_key`].
    ///
    /// Keys the lookup does not know about stay disabled.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<bool>) -> Self {
        Self(
            WebhookEvent::ALL
                .into_iter()
                .filter(|event| lookup(event.config_key()).unwrap_or(false))
                .collect(),
        )
    }

    #[must_use]
    pub fn with(mut self, event: WebhookEvent) -> Self {
        self.0.insert(event);
        self
    }

    pub fn set(&mut self, event: WebhookEvent, enabled: bool) {
        if enabled {
            self.0.insert(event);
        } else {
            self.0.remove(&event);
        }
    }

    pub fn is_enabled(&self, event: WebhookEvent) -> bool {
        self.0.contains(&event)
    }
}
