//! API Router and Application State
//!
//! Central routing configuration and shared state.

pub mod chat;
pub mod group;
pub mod instance;
pub mod message;
pub mod webhook;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use validator::Validate;

use crate::config::Config;
use crate::whatsapp::{WaError, WaInstance, WaMonitor};

/// Media bodies arrive base64-encoded inside JSON.
const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Registry of live instances
    pub monitor: Arc<WaMonitor>,
    /// Server configuration
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(monitor: Arc<WaMonitor>, config: Config) -> Self {
        Self {
            monitor,
            config: Arc::new(config),
        }
    }

    /// Resolve the instance a route is scoped to.
    pub fn instance(&self, name: &str) -> Result<Arc<WaInstance>, WaError> {
        self.monitor.get(name)
    }
}

/// Run the derive validators and surface failures as a 400.
pub fn validate<T: Validate>(body: &T) -> Result<(), WaError> {
    body.validate()
        .map_err(|e| WaError::Validation(e.to_string()))
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let instance_routes = Router::new()
        .route("/create", post(instance::create))
        .route("/connect/{instance}", get(instance::connect))
        .route("/connectionState/{instance}", get(instance::connection_state))
        .route("/fetchInstances", get(instance::fetch_instances))
        .route("/logout/{instance}", delete(instance::logout))
        .route("/delete/{instance}", delete(instance::delete));

    let message_routes = Router::new()
        .route("/sendText/{instance}", post(message::send_text))
        .route("/sendMedia/{instance}", post(message::send_media))
        .route("/sendButtons/{instance}", post(message::send_buttons))
        .route("/sendLocation/{instance}", post(message::send_location))
        .route("/sendList/{instance}", post(message::send_list))
        .route("/sendContact/{instance}", post(message::send_contact))
        .route("/sendReaction/{instance}", post(message::send_reaction));

    let chat_routes = Router::new()
        .route("/whatsappNumbers/{instance}", post(chat::whatsapp_numbers))
        .route("/markMessageAsRead/{instance}", put(chat::mark_message_as_read))
        .route("/archiveChat/{instance}", put(chat::archive_chat))
        .route(
            "/fetchProfilePictureUrl/{instance}",
            post(chat::fetch_profile_picture_url),
        )
        .route("/findContacts/{instance}", post(chat::find_contacts))
        .route("/findMessages/{instance}", post(chat::find_messages))
        .route("/findStatusMessage/{instance}", post(chat::find_status_message))
        .route(
            "/getBase64FromMediaMessage/{instance}",
            post(chat::get_base64_from_media_message),
        );

    let group_routes = Router::new()
        .route("/create/{instance}", post(group::create))
        .route("/updateGroupSubject/{instance}", put(group::update_subject))
        .route(
            "/updateGroupDescription/{instance}",
            put(group::update_description),
        )
        .route("/updateGroupPicture/{instance}", put(group::update_picture))
        .route("/findGroupInfos/{instance}", get(group::find_group_infos))
        .route("/inviteCode/{instance}", get(group::invite_code))
        .route("/revokeInviteCode/{instance}", put(group::revoke_invite_code))
        .route("/participants/{instance}", get(group::participants))
        .route("/updateParticipant/{instance}", put(group::update_participant))
        .route("/leaveGroup/{instance}", delete(group::leave_group));

    let webhook_routes = Router::new()
        .route("/set/{instance}", post(webhook::set))
        .route("/find/{instance}", get(webhook::find));

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/instance", instance_routes)
        .nest("/message", message_routes)
        .nest("/chat", chat_routes)
        .nest("/group", group_routes)
        .nest("/webhook", webhook_routes)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Instances currently registered
    instances: usize,
    /// Whether records are persisted
    database: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instances: state.monitor.len(),
        database: state.config.database.enabled,
    })
}
