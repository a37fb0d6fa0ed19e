//! Group Routes
//!
//! Lookups take the group as a `groupJid` query parameter; mutations take a
//! JSON body.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use super::{validate, AppState};
use crate::whatsapp::dto::{
    CreateGroupRequest, GroupDescriptionRequest, GroupJidQuery, GroupPictureRequest,
    GroupSubjectRequest, UpdateParticipantsRequest,
};
use crate::whatsapp::groups::{
    CreatedGroup, GroupUpdate, InviteCode, LeftGroup, Participants, ParticipantsUpdate,
    RevokedInvite,
};
use crate::whatsapp::WaError;

/// POST /group/create/{instance}
pub async fn create(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<CreatedGroup>), WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok((StatusCode::CREATED, Json(instance.create_group(&body).await?)))
}

/// PUT /group/updateGroupSubject/{instance}
pub async fn update_subject(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<GroupSubjectRequest>,
) -> Result<Json<GroupUpdate>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.update_group_subject(&body).await?))
}

/// PUT /group/updateGroupDescription/{instance}
pub async fn update_description(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<GroupDescriptionRequest>,
) -> Result<Json<GroupUpdate>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.update_group_description(&body).await?))
}

/// PUT /group/updateGroupPicture/{instance}
pub async fn update_picture(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<GroupPictureRequest>,
) -> Result<Json<GroupUpdate>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.update_group_picture(&body).await?))
}

/// GET /group/findGroupInfos/{instance}?groupJid=
pub async fn find_group_infos(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Query(query): Query<GroupJidQuery>,
) -> Result<Json<Value>, WaError> {
    validate(&query)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.find_group(&query.group_jid).await?))
}

/// GET /group/inviteCode/{instance}?groupJid=
pub async fn invite_code(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Query(query): Query<GroupJidQuery>,
) -> Result<Json<InviteCode>, WaError> {
    validate(&query)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.invite_code(&query.group_jid).await?))
}

/// PUT /group/revokeInviteCode/{instance}?groupJid=
pub async fn revoke_invite_code(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Query(query): Query<GroupJidQuery>,
) -> Result<Json<RevokedInvite>, WaError> {
    validate(&query)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.revoke_invite_code(&query.group_jid).await?))
}

/// GET /group/participants/{instance}?groupJid=
pub async fn participants(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Query(query): Query<GroupJidQuery>,
) -> Result<Json<Participants>, WaError> {
    validate(&query)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.find_participants(&query.group_jid).await?))
}

/// PUT /group/updateParticipant/{instance}
pub async fn update_participant(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(body): Json<UpdateParticipantsRequest>,
) -> Result<Json<ParticipantsUpdate>, WaError> {
    validate(&body)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.update_participants(&body).await?))
}

/// DELETE /group/leaveGroup/{instance}?groupJid=
pub async fn leave_group(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Query(query): Query<GroupJidQuery>,
) -> Result<Json<LeftGroup>, WaError> {
    validate(&query)?;
    let instance = state.instance(&instance)?;
    Ok(Json(instance.leave_group(&query.group_jid).await?))
}
