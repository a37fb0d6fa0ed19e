//! Message Routes
//!
//! Every send answers 201 with the message as recorded by the network.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use wr_common::WaMessage;

use super::{validate, AppState};
use crate::whatsapp::dto::{
    SendButtonsRequest, SendContactRequest, SendListRequest, SendLocationRequest,
    SendMediaRequest, SendReactionRequest, SendTextRequest,
};
use crate::whatsapp::WaError;

type Sent = (StatusCode, Json<WaMessage>);

fn sent(message: WaMessage) -> Sent {
    (StatusCode::CREATED, Json(message))
}

/// POST /message/sendText/{instance}
pub async fn send_text(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<SendTextRequest>,
) -> Result<Sent, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(sent(instance.send_text(&body).await?))
}

/// POST /message/sendMedia/{instance}
pub async fn send_media(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<SendMediaRequest>,
) -> Result<Sent, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(sent(instance.send_media(&body).await?))
}

/// POST /message/sendButtons/{instance}
pub async fn send_buttons(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<SendButtonsRequest>,
) -> Result<Sent, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(sent(instance.send_buttons(&body).await?))
}

/// POST /message/sendLocation/{instance}
pub async fn send_location(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<SendLocationRequest>,
) -> Result<Sent, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(sent(instance.send_location(&body).await?))
}

/// POST /message/sendList/{instance}
pub async fn send_list(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<SendListRequest>,
) -> Result<Sent, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(sent(instance.send_list(&body).await?))
}

/// POST /message/sendContact/{instance}
pub async fn send_contact(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<SendContactRequest>,
) -> Result<Sent, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(sent(instance.send_contact(&body).await?))
}

/// POST /message/sendReaction/{instance}
pub async fn send_reaction(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<SendReactionRequest>,
) -> Result<Sent, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(sent(instance.send_reaction(&body).await?))
}
