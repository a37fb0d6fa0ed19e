//! Chat Routes

use axum::extract::{Path, State};
use axum::Json;
use wr_common::WaMessage;

use super::{validate, AppState};
use crate::store::{ContactRecord, MessageRecord, MessageUpdateRecord};
use crate::whatsapp::chat::{ArchivedChat, NumberStatus, ReadReceipt};
use crate::whatsapp::dto::{
    ArchiveChatRequest, FindContactsRequest, FindMessagesRequest, FindStatusRequest,
    NumberRequest, ReadMessagesRequest, WhatsAppNumbersRequest,
};
use crate::whatsapp::media::MediaContent;
use crate::whatsapp::{ProfilePicture, WaError};

/// POST /chat/whatsappNumbers/{instance}
pub async fn whatsapp_numbers(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<WhatsAppNumbersRequest>,
) -> Result<Json<Vec<NumberStatus>>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.whatsapp_number(&body.numbers).await?))
}

/// PUT /chat/markMessageAsRead/{instance}
pub async fn mark_message_as_read(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<ReadMessagesRequest>,
) -> Result<Json<ReadReceipt>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.mark_message_as_read(&body.read_messages).await?))
}

/// PUT /chat/archiveChat/{instance}
pub async fn archive_chat(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<ArchiveChatRequest>,
) -> Result<Json<ArchivedChat>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.archive_chat(&body).await?))
}

/// POST /chat/fetchProfilePictureUrl/{instance}
pub async fn fetch_profile_picture_url(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<NumberRequest>,
) -> Result<Json<ProfilePicture>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.profile_picture(&body.number).await))
}

/// POST /chat/findContacts/{instance}
pub async fn find_contacts(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<FindContactsRequest>,
) -> Result<Json<Vec<ContactRecord>>, WaError> {
    let instance = state.instance(&instance)?;
    Ok(Json(instance.fetch_contacts(&body).await?))
}

/// POST /chat/findMessages/{instance}
pub async fn find_messages(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<FindMessagesRequest>,
) -> Result<Json<Vec<MessageRecord>>, WaError> {
    let instance = state.instance(&instance)?;
    Ok(Json(instance.fetch_messages(&body).await?))
}

/// POST /chat/findStatusMessage/{instance}
pub async fn find_status_message(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<FindStatusRequest>,
) -> Result<Json<Vec<MessageUpdateRecord>>, WaError> {
    let instance = state.instance(&instance)?;
    Ok(Json(instance.find_status_message(&body).await?))
}

/// POST /chat/getBase64FromMediaMessage/{instance}
pub async fn get_base64_from_media_message(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(message): Json<WaMessage>,
) -> Result<Json<MediaContent>, WaError> {
    let instance = state.instance(&instance)?;
    Ok(Json(instance.get_base64_from_media_message(&message).await?))
}
