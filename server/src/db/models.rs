//! Database Models

use serde_json::Value;
use sqlx::FromRow;
use wr_common::{MessageKey, MessageSource, MessageStatus};

use crate::store::{ChatRecord, ContactRecord, MessageClass, MessageRecord, MessageUpdateRecord};
use crate::webhooks::LocalWebhook;

/// Row of `messages`.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub owner: String,
    pub key_id: String,
    pub remote_jid: String,
    pub from_me: bool,
    pub participant: Option<String>,
    pub push_name: Option<String>,
    pub message: Value,
    pub message_timestamp: i64,
    pub source: Option<String>,
    pub class: String,
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        Self {
            key: MessageKey {
                id: row.key_id,
                remote_jid: row.remote_jid,
                from_me: row.from_me,
                participant: row.participant,
            },
            push_name: row.push_name,
            message: row.message,
            message_timestamp: row.message_timestamp,
            owner: row.owner,
            source: row.source.as_deref().and_then(MessageSource::parse_str),
            class: MessageClass::parse_str(&row.class),
        }
    }
}

/// Row of `message_updates`.
#[derive(Debug, Clone, FromRow)]
pub struct MessageUpdateRow {
    pub owner: String,
    pub message_id: String,
    pub remote_jid: String,
    pub from_me: bool,
    pub participant: Option<String>,
    pub status: Option<String>,
    pub datetime: i64,
}

impl MessageUpdateRow {
    pub fn into_record(self) -> MessageUpdateRecord {
        MessageUpdateRecord {
            status: self.status.as_deref().and_then(MessageStatus::parse_str),
            id: self.message_id,
            remote_jid: self.remote_jid,
            from_me: self.from_me,
            participant: self.participant,
            datetime: self.datetime,
            owner: self.owner,
        }
    }
}

/// Row of `contacts`.
#[derive(Debug, Clone, FromRow)]
pub struct ContactRow {
    pub owner: String,
    pub id: String,
    pub push_name: Option<String>,
    pub profile_picture_url: Option<String>,
}

impl From<ContactRow> for ContactRecord {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            push_name: row.push_name,
            profile_picture_url: row.profile_picture_url,
            owner: row.owner,
        }
    }
}

/// Row of `chats`.
#[derive(Debug, Clone, FromRow)]
pub struct ChatRow {
    pub owner: String,
    pub id: String,
}

impl From<ChatRow> for ChatRecord {
    fn from(row: ChatRow) -> Self {
        Self {
            id: row.id,
            owner: row.owner,
        }
    }
}

/// Row of `instance_webhooks`.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookRow {
    pub instance: String,
    pub enabled: bool,
    pub url: String,
}

impl From<WebhookRow> for LocalWebhook {
    fn from(row: WebhookRow) -> Self {
        Self {
            enabled: row.enabled,
            url: row.url,
        }
    }
}
