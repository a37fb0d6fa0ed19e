//! Per-Instance Webhook Routes

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::{validate, AppState};
use crate::webhooks::LocalWebhook;
use crate::whatsapp::dto::WebhookRequest;
use crate::whatsapp::WaError;

/// POST /webhook/set/{instance}
pub async fn set(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<WebhookRequest>,
) -> Result<(StatusCode, Json<LocalWebhook>), WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;

    let webhook = LocalWebhook {
        enabled: body.enabled,
        url: body.url,
    };
    instance.set_webhook(webhook.clone()).await?;
    Ok((StatusCode::CREATED, Json(webhook)))
}

/// GET /webhook/find/{instance}
pub async fn find(
    State(state): State<AppState>,
    Path(instance): Path<String>,
) -> Result<Json<LocalWebhook>, WaError> {
    let instance = state.instance(&instance)?;
    Ok(Json(instance.webhook().await))
}
