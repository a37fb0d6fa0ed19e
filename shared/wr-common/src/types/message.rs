//! Message Types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol-internal payload keys that never reach subscribers.
const INTERNAL_PAYLOAD_KEYS: &[&str] = &["protocolMessage", "senderKeyDistributionMessage"];

/// Identity of a message within a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Protocol message id.
    #[serde(default)]
    pub id: String,
    /// Conversation the message belongs to.
    #[serde(default)]
    pub remote_jid: String,
    /// Whether the message was sent by this account.
    #[serde(default)]
    pub from_me: bool,
    /// Sender inside a group conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// Network timestamp as emitted by the protocol layer.
///
/// Depending on the transport this is a plain number, a decimal string or a
/// split 64-bit `{low, high, unsigned}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageTimestamp {
    Seconds(i64),
    Long {
        low: i32,
        high: i32,
        #[serde(default)]
        unsigned: bool,
    },
    Text(String),
}

impl MessageTimestamp {
    /// Collapse to a plain integer.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Seconds(secs) => *secs,
            Self::Long { low, high, .. } => (i64::from(*high) << 32) | i64::from(*low as u32),
            Self::Text(text) => text.trim().parse().unwrap_or_default(),
        }
    }
}

impl From<i64> for MessageTimestamp {
    fn from(secs: i64) -> Self {
        Self::Seconds(secs)
    }
}

/// Inbound message as delivered by the connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaMessage {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Opaque protocol payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<MessageTimestamp>,
}

impl WaMessage {
    /// Payload worth relaying: present, non-empty and not protocol-internal.
    pub fn content(&self) -> Option<&Value> {
        let message = self.message.as_ref()?;
        let object = message.as_object()?;
        if object.is_empty() || INTERNAL_PAYLOAD_KEYS.iter().any(|k| object.contains_key(*k)) {
            return None;
        }
        Some(message)
    }

    /// Timestamp as a plain integer (0 when absent).
    pub fn timestamp(&self) -> i64 {
        self.message_timestamp
            .as_ref()
            .map(MessageTimestamp::as_i64)
            .unwrap_or_default()
    }
}

/// Device class a message originated from, derived from its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Android,
    Ios,
    Web,
}

impl MessageSource {
    /// Classify a message id.
    ///
    /// Long ids come from Android, `3A`-prefixed ids from iOS, everything
    /// else from web or desktop clients.
    pub fn from_message_id(id: &str) -> Self {
        if id.len() > 21 {
            Self::Android
        } else if id.starts_with("3A") {
            Self::Ios
        } else {
            Self::Web
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Web => "web",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "android" => Some(Self::Android),
            "ios" => Some(Self::Ios),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Error,
    Pending,
    ServerAck,
    DeliveryAck,
    Read,
    Played,
}

impl MessageStatus {
    /// Map the numeric protocol status code.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Error),
            1 => Some(Self::Pending),
            2 => Some(Self::ServerAck),
            3 => Some(Self::DeliveryAck),
            4 => Some(Self::Read),
            5 => Some(Self::Played),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Pending => "PENDING",
            Self::ServerAck => "SERVER_ACK",
            Self::DeliveryAck => "DELIVERY_ACK",
            Self::Read => "READ",
            Self::Played => "PLAYED",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "ERROR" => Some(Self::Error),
            "PENDING" => Some(Self::Pending),
            "SERVER_ACK" => Some(Self::ServerAck),
            "DELIVERY_ACK" => Some(Self::DeliveryAck),
            "READ" => Some(Self::Read),
            "PLAYED" => Some(Self::Played),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single status change for a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub key: MessageKey,
    #[serde(default)]
    pub update: MessageUpdateFields,
}

/// Changed fields of a message update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdateFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
}
