//! Connection Collaborator
//!
//! The encrypted transport lives outside this crate. A [`Connector`] opens a
//! session and hands back a [`Connection`] for commands plus a stream of
//! [`ConnectionEvent`]s in the order the transport emitted them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use wr_common::{
    Chat, ConnectedUser, Contact, ConnectionUpdate, MessageKey, MessageUpdate, Presence,
    PresenceUpdate, WaMessage,
};

use super::error::ConnectionError;

/// Parameters of a single connect attempt.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub instance: String,
    /// Stored credentials; `None` starts a fresh pairing.
    pub credentials: Option<Value>,
    /// Client, browser name and host release.
    pub browser: [String; 3],
    pub version: Option<Vec<u32>>,
    pub connect_timeout: Duration,
}

/// Whether an upsert is a live notification or a history backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertType {
    Notify,
    Append,
}

/// Events emitted by a live connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ConnectionEvent {
    #[serde(rename = "connection.update")]
    ConnectionUpdate(ConnectionUpdate),

    /// Credential material changed and must be persisted.
    #[serde(rename = "creds.update")]
    CredsUpdate(Value),

    #[serde(rename = "chats.set")]
    ChatsSet {
        chats: Vec<Chat>,
        #[serde(rename = "isLatest", default)]
        is_latest: bool,
    },

    #[serde(rename = "chats.upsert")]
    ChatsUpsert(Vec<Chat>),

    #[serde(rename = "chats.update")]
    ChatsUpdate(Vec<Chat>),

    #[serde(rename = "contacts.upsert")]
    ContactsUpsert(Vec<Contact>),

    #[serde(rename = "contacts.update")]
    ContactsUpdate(Vec<Contact>),

    #[serde(rename = "messages.set")]
    MessagesSet {
        messages: Vec<WaMessage>,
        #[serde(rename = "isLatest", default)]
        is_latest: bool,
    },

    #[serde(rename = "messages.upsert")]
    MessagesUpsert {
        messages: Vec<WaMessage>,
        #[serde(rename = "type")]
        kind: UpsertType,
    },

    #[serde(rename = "messages.update")]
    MessagesUpdate(Vec<MessageUpdate>),

    #[serde(rename = "presence.update")]
    PresenceUpdate(PresenceUpdate),
}

impl ConnectionEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionUpdate(_) => "connection.update",
            Self::CredsUpdate(_) => "creds.update",
            Self::ChatsSet { .. } => "chats.set",
            Self::ChatsUpsert(_) => "chats.upsert",
            Self::ChatsUpdate(_) => "chats.update",
            Self::ContactsUpsert(_) => "contacts.upsert",
            Self::ContactsUpdate(_) => "contacts.update",
            Self::MessagesSet { .. } => "messages.set",
            Self::MessagesUpsert { .. } => "messages.upsert",
            Self::MessagesUpdate(_) => "messages.update",
            Self::PresenceUpdate(_) => "presence.update",
        }
    }
}

/// Media kinds the transport can upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Document,
    Video,
    Audio,
    Sticker,
}

impl MediaKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Sticker => "sticker",
        }
    }

    /// Payload key of this kind inside a message (`imageMessage`).
    pub fn message_key(&self) -> String {
        format!("{}Message", self.as_str())
    }
}

/// Source of a media upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaInput {
    /// Fetched by the transport.
    Url(String),
    Bytes(Vec<u8>),
}

/// Result of an on-network lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnWhatsApp {
    pub exists: bool,
    pub jid: String,
}

/// Group membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// A live session plus its event stream.
pub struct Session {
    pub connection: Arc<dyn Connection>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// Opens sessions against the messaging network.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Newest protocol version the network accepts, when it can be fetched.
    async fn latest_version(&self) -> Option<Vec<u32>>;

    async fn connect(&self, options: ConnectOptions) -> Result<Session, ConnectionError>;
}

/// Command surface of a live session.
///
/// Message content and group metadata are opaque protocol documents.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Account the session authenticated as, once paired.
    fn user(&self) -> Option<ConnectedUser>;

    /// Send `content` to `jid`, returning the message as recorded by the network.
    async fn send_message(&self, jid: &str, content: Value) -> Result<WaMessage, ConnectionError>;

    async fn presence_subscribe(&self, jid: &str) -> Result<(), ConnectionError>;

    async fn send_presence_update(
        &self,
        presence: Presence,
        jid: &str,
    ) -> Result<(), ConnectionError>;

    async fn profile_picture_url(&self, jid: &str) -> Result<Option<String>, ConnectionError>;

    async fn on_whatsapp(&self, jid: &str) -> Result<Vec<OnWhatsApp>, ConnectionError>;

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), ConnectionError>;

    async fn chat_modify(&self, jid: &str, modification: Value) -> Result<(), ConnectionError>;

    /// Upload media and return the `{<kind>Message: {...}}` payload.
    async fn prepare_media(
        &self,
        kind: MediaKind,
        media: MediaInput,
    ) -> Result<Value, ConnectionError>;

    async fn download_media(&self, message: &WaMessage) -> Result<Vec<u8>, ConnectionError>;

    /// Create a group and return its metadata.
    async fn group_create(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<Value, ConnectionError>;

    async fn group_update_subject(&self, jid: &str, subject: &str) -> Result<(), ConnectionError>;

    async fn group_update_description(
        &self,
        jid: &str,
        description: &str,
    ) -> Result<(), ConnectionError>;

    async fn group_metadata(&self, jid: &str) -> Result<Value, ConnectionError>;

    async fn group_invite_code(&self, jid: &str) -> Result<String, ConnectionError>;

    async fn group_revoke_invite(&self, jid: &str) -> Result<String, ConnectionError>;

    async fn group_participants_update(
        &self,
        jid: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<Value, ConnectionError>;

    async fn group_leave(&self, jid: &str) -> Result<(), ConnectionError>;

    async fn update_profile_picture(&self, jid: &str, image: Vec<u8>)
        -> Result<(), ConnectionError>;

    /// Log the account out; the session is unusable afterwards.
    async fn logout(&self) -> Result<(), ConnectionError>;

    /// Close the transport without logging out.
    async fn end(&self);
}
