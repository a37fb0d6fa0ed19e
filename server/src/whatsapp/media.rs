//! Media Preparation
//!
//! Upload payloads built from a URL or base64 body, and downloads of media
//! carried by received messages.

use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use wr_common::WaMessage;

use super::connection::{Connection, MediaInput, MediaKind};
use super::dto::MediaMessage;
use super::error::WaError;
use super::instance::WaInstance;
use crate::webhooks::is_valid_url;

/// Last path segment up to its first dot: `https://x/docs/report.v2.pdf` -> `report`.
static FILE_NAME_FROM_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*/(.+?)\.").expect("valid regex"));

/// Payload keys checked, in order, when extracting media from a message.
const MEDIA_PAYLOAD_KEYS: [&str; 5] = [
    "imageMessage",
    "documentMessage",
    "audioMessage",
    "videoMessage",
    "stickerMessage",
];

/// File name for a document sent without one.
pub fn document_file_name(media: &str) -> Option<String> {
    FILE_NAME_FROM_URL
        .captures(media)
        .map(|caps| caps[1].to_string())
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, WaError> {
    STANDARD
        .decode(data.trim())
        .map_err(|_| WaError::validation("media must be a URL or a base64 string"))
}

/// MIME type from the URL path, the file name, or the bytes themselves.
pub fn guess_mime(media: &str, file_name: Option<&str>, bytes: Option<&[u8]>) -> Option<String> {
    let from_path = if is_valid_url(media) {
        reqwest::Url::parse(media)
            .ok()
            .and_then(|url| mime_guess::from_path(url.path()).first())
    } else {
        file_name.and_then(|name| mime_guess::from_path(name).first())
    };

    from_path
        .map(|mime| mime.essence_str().to_string())
        .or_else(|| bytes.and_then(infer::get).map(|kind| kind.mime_type().to_string()))
}

/// Decorate the prepared `{<kind>Message: {...}}` payload with caption, MIME and file name.
pub fn decorate_media(
    prepared: Value,
    kind: MediaKind,
    caption: Option<&str>,
    mimetype: Option<&str>,
    file_name: Option<&str>,
) -> Result<Value, WaError> {
    let key = kind.message_key();
    let Some(Value::Object(mut payload)) = prepared.get(&key).cloned() else {
        return Err(WaError::protocol(
            "Error preparing media",
            format!("upload returned no {key}"),
        ));
    };

    for (field, value) in [
        ("caption", caption),
        ("mimetype", mimetype),
        ("fileName", file_name),
    ] {
        if let Some(value) = value {
            payload.insert(field.to_string(), json!(value));
        }
    }

    let mut message = serde_json::Map::new();
    message.insert(key, Value::Object(payload));
    Ok(Value::Object(message))
}

/// Media body extracted from a received message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    pub media_type: String,
    pub file_name: Option<Value>,
    pub caption: Option<Value>,
    pub size: MediaSize,
    pub mimetype: Option<Value>,
    pub base64: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSize {
    pub file_length: Option<Value>,
    pub height: Option<Value>,
    pub width: Option<Value>,
}

/// First media payload of `message`, with its key.
pub fn find_media(message: &WaMessage) -> Option<(&'static str, &Value)> {
    let content = message.message.as_ref()?;
    MEDIA_PAYLOAD_KEYS
        .iter()
        .find_map(|key| content.get(*key).filter(|v| v.is_object()).map(|v| (*key, v)))
}

impl WaInstance {
    /// Upload `media` and return the message payload ready for sending.
    pub(super) async fn prepare_media_message(
        &self,
        connection: &dyn Connection,
        media: &MediaMessage,
    ) -> Result<Value, WaError> {
        let mut file_name = media.file_name.clone();
        if media.mediatype == MediaKind::Document && file_name.is_none() {
            file_name = Some(document_file_name(&media.media).ok_or_else(|| {
                WaError::validation("fileName is required when it cannot be derived from the media URL")
            })?);
        }

        let (input, bytes) = if is_valid_url(&media.media) {
            (MediaInput::Url(media.media.clone()), None)
        } else {
            let bytes = decode_base64(&media.media)?;
            (MediaInput::Bytes(bytes.clone()), Some(bytes))
        };

        let mimetype = guess_mime(&media.media, file_name.as_deref(), bytes.as_deref());

        let prepared = connection
            .prepare_media(media.mediatype, input)
            .await
            .map_err(|e| WaError::protocol("Error preparing media", e))?;

        decorate_media(
            prepared,
            media.mediatype,
            media.caption.as_deref(),
            mimetype.as_deref(),
            file_name.as_deref(),
        )
    }

    /// Download the media body of a received message.
    pub async fn get_base64_from_media_message(
        &self,
        message: &WaMessage,
    ) -> Result<MediaContent, WaError> {
        let connection = self.connection().await?;
        let (media_type, payload) = find_media(message)
            .ok_or_else(|| WaError::validation("The message is not of the media type"))?;

        let bytes = connection
            .download_media(message)
            .await
            .map_err(|e| WaError::protocol("Error downloading media", e))?;

        let field = |name: &str| payload.get(name).filter(|v| !v.is_null()).cloned();
        Ok(MediaContent {
            media_type: media_type.to_string(),
            file_name: field("fileName"),
            caption: field("caption"),
            size: MediaSize {
                file_length: field("fileLength"),
                height: field("height"),
                width: field("width"),
            },
            mimetype: field("mimetype"),
            base64: STANDARD.encode(bytes),
        })
    }
}
