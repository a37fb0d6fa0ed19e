//! Instance Routes
//!
//! Provisioning, pairing and teardown of managed accounts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use super::{validate, AppState};
use crate::webhooks::LocalWebhook;
use crate::whatsapp::dto::CreateInstanceRequest;
use crate::whatsapp::{ConnectResponse, InstanceInfo, InstanceState, WaError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInstance {
    pub instance_name: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CreateInstanceResponse {
    pub instance: CreatedInstance,
    pub webhook: LocalWebhook,
}

/// POST /instance/create
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateInstanceRequest>,
) -> Result<impl IntoResponse, WaError> {
    validate(&body)?;

    let webhook = body.webhook.map(|hook| LocalWebhook {
        enabled: hook.enabled,
        url: hook.url,
    });
    let instance = state
        .monitor
        .create_instance(&body.instance_name, webhook)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateInstanceResponse {
            instance: CreatedInstance {
                instance_name: instance.name().to_string(),
                status: "created",
            },
            webhook: instance.webhook().await,
        }),
    ))
}

/// GET /instance/connect/{instance}
pub async fn connect(
    State(state): State<AppState>,
    Path(instance): Path<String>,
) -> Result<Json<ConnectResponse>, WaError> {
    Ok(Json(state.monitor.connect(&instance).await?))
}

#[derive(Debug, Serialize)]
pub struct ConnectionStateResponse {
    pub instance: InstanceState,
}

/// GET /instance/connectionState/{instance}
pub async fn connection_state(
    State(state): State<AppState>,
    Path(instance): Path<String>,
) -> Result<Json<ConnectionStateResponse>, WaError> {
    let instance = state.monitor.connection_state(&instance).await?;
    Ok(Json(ConnectionStateResponse { instance }))
}

/// GET /instance/fetchInstances
pub async fn fetch_instances(State(state): State<AppState>) -> Json<Vec<InstanceInfo>> {
    Json(state.monitor.list().await)
}

/// DELETE /instance/logout/{instance}
pub async fn logout(
    State(state): State<AppState>,
    Path(instance): Path<String>,
) -> Result<impl IntoResponse, WaError> {
    state.monitor.logout_instance(&instance).await?;
    Ok(Json(json!({ "error": false, "message": "Instance logged out" })))
}

/// DELETE /instance/delete/{instance}
pub async fn delete(
    State(state): State<AppState>,
    Path(instance): Path<String>,
) -> Result<impl IntoResponse, WaError> {
    state.monitor.delete_instance(&instance).await?;
    Ok(Json(json!({ "error": false, "message": "Instance deleted" })))
}
