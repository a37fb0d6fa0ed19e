//! Request Types
//!
//! JSON bodies accepted by the instance, message, chat and group routes.
//! Field names follow the camelCase wire format clients already speak.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
use wr_common::{MessageKey, MessageTimestamp, Presence};

use super::connection::{MediaKind, ParticipantAction};
use crate::store::is_valid_instance_name;
use crate::webhooks::is_valid_url;

// ============================================================================
// Instance
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    /// Empty or absent names get a generated UUID.
    #[serde(default)]
    #[validate(
        length(max = 100, message = "instanceName must be at most 100 characters"),
        custom(function = "validate_instance_name")
    )]
    pub instance_name: String,
    #[validate(nested)]
    pub webhook: Option<WebhookRequest>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[validate(custom(function = "validate_webhook_url"))]
    pub url: String,
}

const fn default_true() -> bool {
    true
}

#[allow(clippy::ptr_arg)]
fn validate_instance_name(name: &String) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() || is_valid_instance_name(name) {
        Ok(())
    } else {
        Err(ValidationError::new("instance_name")
            .with_message("instanceName must not contain path separators".into()))
    }
}

#[allow(clippy::ptr_arg)]
fn validate_webhook_url(url: &String) -> Result<(), ValidationError> {
    if is_valid_url(url) {
        Ok(())
    } else {
        Err(ValidationError::new("url").with_message("Invalid URL".into()))
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Typing simulation applied before a send.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    /// Milliseconds to hold the presence before sending.
    pub delay: Option<u64>,
    /// Presence shown while waiting (default: composing).
    pub presence: Option<Presence>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
    #[serde(default)]
    pub options: Option<SendOptions>,
    #[validate(nested)]
    pub text_message: TextMessage,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TextMessage {
    #[validate(length(min = 1, message = "text is required"))]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    pub mediatype: MediaKind,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    /// URL or base64 body.
    #[validate(length(min = 1, message = "media is required"))]
    pub media: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaRequest {
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
    #[serde(default)]
    pub options: Option<SendOptions>,
    #[validate(nested)]
    pub media_message: MediaMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    #[validate(length(min = 1, message = "buttonText is required"))]
    pub button_text: String,
    #[validate(length(min = 1, message = "buttonId is required"))]
    pub button_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ButtonMessage {
    pub title: String,
    pub description: String,
    pub footer_text: Option<String>,
    #[validate(length(min = 1, message = "at least one button is required"), nested)]
    pub buttons: Vec<Button>,
    #[validate(nested)]
    pub media_message: Option<MediaMessage>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendButtonsRequest {
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
    #[serde(default)]
    pub options: Option<SendOptions>,
    #[validate(nested)]
    pub button_message: ButtonMessage,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationMessage {
    #[validate(range(min = -90.0, max = 90.0, message = "latitude out of range"))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "longitude out of range"))]
    pub longitude: f64,
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendLocationRequest {
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
    #[serde(default)]
    pub options: Option<SendOptions>,
    #[validate(nested)]
    pub location_message: LocationMessage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    pub title: String,
    pub description: Option<String>,
    pub row_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ListSection {
    pub title: String,
    #[validate(length(min = 1, message = "a section needs at least one row"))]
    pub rows: Vec<ListRow>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListMessage {
    pub title: String,
    pub description: String,
    pub footer_text: Option<String>,
    pub button_text: String,
    #[validate(length(min = 1, message = "at least one section is required"), nested)]
    pub sections: Vec<ListSection>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendListRequest {
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
    #[serde(default)]
    pub options: Option<SendOptions>,
    #[validate(nested)]
    pub list_message: ListMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactCard {
    #[validate(length(min = 1, message = "fullName is required"))]
    pub full_name: String,
    /// Account number the card links to.
    #[validate(length(min = 1, message = "wuid is required"))]
    pub wuid: String,
    #[validate(length(min = 1, message = "phoneNumber is required"))]
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendContactRequest {
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
    #[serde(default)]
    pub options: Option<SendOptions>,
    #[validate(length(min = 1, message = "at least one contact is required"), nested)]
    pub contact_message: Vec<ContactCard>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReactionMessage {
    pub key: MessageKey,
    /// Emoji, or empty to remove a reaction.
    pub reaction: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendReactionRequest {
    #[validate(nested)]
    pub reaction_message: ReactionMessage,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WhatsAppNumbersRequest {
    #[validate(length(min = 1, message = "at least one number is required"))]
    pub numbers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReadMessagesRequest {
    #[validate(length(min = 1, message = "at least one message is required"))]
    pub read_messages: Vec<MessageKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub key: MessageKey,
    pub message_timestamp: Option<MessageTimestamp>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveChatRequest {
    pub last_message: LastMessage,
    pub archive: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NumberRequest {
    #[validate(length(min = 1, message = "number is required"))]
    pub number: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactWhere {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindContactsRequest {
    #[serde(default, rename = "where")]
    pub filter: ContactWhere,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFilter {
    pub id: Option<String>,
    pub remote_jid: Option<String>,
    pub from_me: Option<bool>,
    pub participant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageWhere {
    #[serde(default)]
    pub key: KeyFilter,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindMessagesRequest {
    #[serde(default, rename = "where")]
    pub filter: MessageWhere,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusWhere {
    pub id: Option<String>,
    pub remote_jid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindStatusRequest {
    #[serde(default, rename = "where")]
    pub filter: StatusWhere,
    pub limit: Option<i64>,
}

// ============================================================================
// Groups
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "subject must be 1-100 characters"))]
    pub subject: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "at least one participant is required"))]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupJidQuery {
    #[validate(length(min = 1, message = "groupJid is required"))]
    pub group_jid: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupSubjectRequest {
    #[validate(length(min = 1, message = "groupJid is required"))]
    pub group_jid: String,
    #[validate(length(min = 1, max = 100, message = "subject must be 1-100 characters"))]
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupDescriptionRequest {
    #[validate(length(min = 1, message = "groupJid is required"))]
    pub group_jid: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupPictureRequest {
    #[validate(length(min = 1, message = "groupJid is required"))]
    pub group_jid: String,
    /// URL or base64 image.
    #[validate(length(min = 1, message = "image is required"))]
    pub image: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParticipantsRequest {
    #[validate(length(min = 1, message = "groupJid is required"))]
    pub group_jid: String,
    pub action: ParticipantAction,
    #[validate(length(min = 1, message = "at least one participant is required"))]
    pub participants: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_text_parses_camel_case() {
        let req: SendTextRequest = serde_json::from_value(json!({
            "number": "5511999999999",
            "options": {"delay": 1200, "presence": "recording"},
            "textMessage": {"text": "hello"}
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        let options = req.options.unwrap();
        assert_eq!(options.delay, Some(1200));
        assert_eq!(options.presence, Some(Presence::Recording));
    }

    #[test]
    fn empty_number_is_rejected() {
        let req: SendTextRequest = serde_json::from_value(json!({
            "number": "",
            "textMessage": {"text": "hello"}
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn nested_media_is_validated() {
        let req: SendMediaRequest = serde_json::from_value(json!({
            "number": "5511999999999",
            "mediaMessage": {"mediatype": "image", "media": ""}
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn location_range_is_checked() {
        let req: SendLocationRequest = serde_json::from_value(json!({
            "number": "5511999999999",
            "locationMessage": {"latitude": 123.0, "longitude": 0.0}
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn instance_name_rejects_path_separators() {
        for name in ["a/b", "..", "back\\slash"] {
            let req = CreateInstanceRequest {
                instance_name: name.into(),
                webhook: None,
            };
            assert!(req.validate().is_err(), "{name} should be rejected");
        }
        for name in ["", "  ", "sales-01", "Loja Centro"] {
            let req = CreateInstanceRequest {
                instance_name: name.into(),
                webhook: None,
            };
            assert!(req.validate().is_ok(), "{name:?} should be accepted");
        }
    }

    #[test]
    fn webhook_url_must_be_valid() {
        let bad: WebhookRequest = serde_json::from_value(json!({"url": "nope"})).unwrap();
        assert!(bad.validate().is_err());
        let good: WebhookRequest =
            serde_json::from_value(json!({"url": "https://hooks.example.com/wa"})).unwrap();
        assert!(good.enabled);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn message_query_reads_key_filters() {
        let req: FindMessagesRequest = serde_json::from_value(json!({
            "where": {"key": {"id": "ABC", "fromMe": true}},
            "limit": 10
        }))
        .unwrap();
        assert_eq!(req.filter.key.id.as_deref(), Some("ABC"));
        assert_eq!(req.filter.key.from_me, Some(true));
        assert_eq!(req.limit, Some(10));

        let empty: FindMessagesRequest = serde_json::from_value(json!({})).unwrap();
        assert!(empty.filter.key.id.is_none());
    }
}
