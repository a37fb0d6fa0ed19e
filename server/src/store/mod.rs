//! Record Store
//!
//! Append/query interface over the persistence engine for messages, message
//! status updates, contacts and chats, plus the credential/session store.
//!
//! Writes go through [`Repository`], which applies the per-kind enable flags
//! before a backend is touched.

mod memory;
mod postgres;
pub mod session;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wr_common::{MessageKey, MessageSource, MessageStatus};

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;
pub use session::{is_valid_instance_name, FileSessionStore, PgSessionStore, SessionStore};

use crate::config::SaveDataConfig;

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classification a message was persisted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    /// Live notification or a message sent through the relay.
    NewMessage,
    /// Initial history sync.
    OldMessage,
}

impl MessageClass {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::OldMessage => "old_message",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "new_message" => Some(Self::NewMessage),
            "old_message" => Some(Self::OldMessage),
            _ => None,
        }
    }
}

/// Normalized message. `(owner, key.id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    pub message: serde_json::Value,
    pub message_timestamp: i64,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MessageSource>,
    #[serde(skip)]
    pub class: Option<MessageClass>,
}

/// Append-only status observation for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdateRecord {
    pub id: String,
    pub remote_jid: String,
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
    /// `None` when the protocol code has no named status.
    pub status: Option<MessageStatus>,
    /// Wall-clock observation time in milliseconds.
    pub datetime: i64,
    pub owner: String,
}

/// Normalized contact. `(owner, id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: String,
    pub push_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub owner: String,
}

/// Normalized chat. `(owner, id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub owner: String,
}

/// Message lookup, always scoped to an owner.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub owner: String,
    pub key_id: Option<String>,
    pub remote_jid: Option<String>,
    pub from_me: Option<bool>,
    pub participant: Option<String>,
    pub limit: Option<i64>,
}

/// Status update lookup, always scoped to an owner.
#[derive(Debug, Clone, Default)]
pub struct MessageUpdateQuery {
    pub owner: String,
    pub id: Option<String>,
    pub remote_jid: Option<String>,
    pub limit: Option<i64>,
}

/// Contact lookup, always scoped to an owner.
#[derive(Debug, Clone, Default)]
pub struct ContactQuery {
    pub owner: String,
    pub id: Option<String>,
    pub limit: Option<i64>,
}

/// Persistence backend.
///
/// Inserts return the number of rows actually written. Duplicate message keys
/// and known contact ids are ignored, never overwritten.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_messages(&self, records: &[MessageRecord]) -> Result<u64, StoreError>;

    /// Ids among `key_ids` already stored for `owner`.
    async fn existing_message_ids(
        &self,
        owner: &str,
        key_ids: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    async fn find_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>, StoreError>;

    async fn insert_message_updates(
        &self,
        records: &[MessageUpdateRecord],
    ) -> Result<u64, StoreError>;

    async fn find_message_updates(
        &self,
        query: &MessageUpdateQuery,
    ) -> Result<Vec<MessageUpdateRecord>, StoreError>;

    /// Insert contacts whose id is not yet known for their owner.
    async fn insert_contacts(&self, records: &[ContactRecord]) -> Result<u64, StoreError>;

    /// Insert or overwrite contacts.
    async fn update_contacts(&self, records: &[ContactRecord]) -> Result<u64, StoreError>;

    /// Ids among `ids` already stored for `owner`.
    async fn existing_contact_ids(
        &self,
        owner: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    async fn find_contacts(&self, query: &ContactQuery) -> Result<Vec<ContactRecord>, StoreError>;

    async fn insert_chats(&self, records: &[ChatRecord]) -> Result<u64, StoreError>;

    async fn find_chats(&self, owner: &str) -> Result<Vec<ChatRecord>, StoreError>;
}

/// Gatekeeper in front of a [`RecordStore`].
///
/// Every insert takes an `enabled` flag (normally a [`SaveDataConfig`] field);
/// a disabled write is a no-op. Without a backend, persistence is off
/// entirely and queries return nothing.
#[derive(Clone)]
pub struct Repository {
    store: Option<Arc<dyn RecordStore>>,
    save: SaveDataConfig,
}

impl Repository {
    pub fn new(store: Arc<dyn RecordStore>, save: SaveDataConfig) -> Self {
        Self {
            store: Some(store),
            save,
        }
    }

    /// Repository with persistence turned off.
    pub fn disabled() -> Self {
        Self {
            store: None,
            save: SaveDataConfig::default(),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Per-kind persistence toggles.
    pub const fn save(&self) -> &SaveDataConfig {
        &self.save
    }

    fn backend(&self, enabled: bool) -> Option<&Arc<dyn RecordStore>> {
        self.store.as_ref().filter(|_| enabled)
    }

    pub async fn insert_messages(
        &self,
        records: &[MessageRecord],
        enabled: bool,
    ) -> Result<u64, StoreError> {
        match self.backend(enabled) {
            Some(store) if !records.is_empty() => store.insert_messages(records).await,
            _ => Ok(0),
        }
    }

    pub async fn existing_message_ids(
        &self,
        owner: &str,
        key_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        match self.store.as_ref() {
            Some(store) if !key_ids.is_empty() => store.existing_message_ids(owner, key_ids).await,
            _ => Ok(HashSet::new()),
        }
    }

    pub async fn find_messages(
        &self,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        match self.store.as_ref() {
            Some(store) => store.find_messages(query).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn insert_message_updates(
        &self,
        records: &[MessageUpdateRecord],
        enabled: bool,
    ) -> Result<u64, StoreError> {
        match self.backend(enabled) {
            Some(store) if !records.is_empty() => store.insert_message_updates(records).await,
            _ => Ok(0),
        }
    }

    pub async fn find_message_updates(
        &self,
        query: &MessageUpdateQuery,
    ) -> Result<Vec<MessageUpdateRecord>, StoreError> {
        match self.store.as_ref() {
            Some(store) => store.find_message_updates(query).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn insert_contacts(
        &self,
        records: &[ContactRecord],
        enabled: bool,
    ) -> Result<u64, StoreError> {
        match self.backend(enabled) {
            Some(store) if !records.is_empty() => store.insert_contacts(records).await,
            _ => Ok(0),
        }
    }

    pub async fn update_contacts(
        &self,
        records: &[ContactRecord],
        enabled: bool,
    ) -> Result<u64, StoreError> {
        match self.backend(enabled) {
            Some(store) if !records.is_empty() => store.update_contacts(records).await,
            _ => Ok(0),
        }
    }

    pub async fn existing_contact_ids(
        &self,
        owner: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        match self.store.as_ref() {
            Some(store) if !ids.is_empty() => store.existing_contact_ids(owner, ids).await,
            _ => Ok(HashSet::new()),
        }
    }

    pub async fn find_contacts(
        &self,
        query: &ContactQuery,
    ) -> Result<Vec<ContactRecord>, StoreError> {
        match self.store.as_ref() {
            Some(store) => store.find_contacts(query).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn insert_chats(
        &self,
        records: &[ChatRecord],
        enabled: bool,
    ) -> Result<u64, StoreError> {
        match self.backend(enabled) {
            Some(store) if !records.is_empty() => store.insert_chats(records).await,
            _ => Ok(0),
        }
    }

    pub async fn find_chats(&self, owner: &str) -> Result<Vec<ChatRecord>, StoreError> {
        match self.store.as_ref() {
            Some(store) => store.find_chats(owner).await,
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("enabled", &self.is_enabled())
            .field("save", &self.save)
            .finish()
    }
}
