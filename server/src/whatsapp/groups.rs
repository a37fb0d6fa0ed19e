//! Group Management

use serde::Serialize;
use serde_json::Value;
use tracing::info;
use wr_common::jid::create_jid;

use super::dto::{
    CreateGroupRequest, GroupDescriptionRequest, GroupPictureRequest, GroupSubjectRequest,
    UpdateParticipantsRequest,
};
use super::error::WaError;
use super::instance::WaInstance;
use super::media::decode_base64;
use crate::webhooks::is_valid_url;

const INVITE_URL_BASE: &str = "https://chat.whatsapp.com/";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGroup {
    pub group_metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupUpdate {
    pub update: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub invite_url: String,
    pub invite_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedInvite {
    pub revoked: bool,
    pub invite_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Participants {
    pub participants: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsUpdate {
    pub update_participants: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeftGroup {
    pub group_jid: String,
    pub leave: bool,
}

pub fn invite_code(code: String) -> InviteCode {
    InviteCode {
        invite_url: format!("{INVITE_URL_BASE}{code}"),
        invite_code: code,
    }
}

const SUCCESS: GroupUpdate = GroupUpdate { update: "success" };

impl WaInstance {
    pub async fn create_group(&self, req: &CreateGroupRequest) -> Result<CreatedGroup, WaError> {
        let connection = self.connection().await?;
        let participants: Vec<String> = req.participants.iter().map(|p| create_jid(p)).collect();
        let create_error = |e| WaError::protocol("Error creating group", e);

        let metadata = connection
            .group_create(&req.subject, &participants)
            .await
            .map_err(create_error)?;

        if let Some(description) = req.description.as_deref().filter(|d| !d.is_empty()) {
            let id = metadata["id"].as_str().unwrap_or_default();
            connection
                .group_update_description(id, description)
                .await
                .map_err(create_error)?;
        }

        info!(instance = %self.name(), subject = %req.subject, "Group created");
        Ok(CreatedGroup {
            group_metadata: metadata,
        })
    }

    pub async fn update_group_subject(
        &self,
        req: &GroupSubjectRequest,
    ) -> Result<GroupUpdate, WaError> {
        let connection = self.connection().await?;
        connection
            .group_update_subject(&req.group_jid, &req.subject)
            .await
            .map_err(|e| WaError::protocol("Error updating group subject", e))?;
        Ok(SUCCESS)
    }

    pub async fn update_group_description(
        &self,
        req: &GroupDescriptionRequest,
    ) -> Result<GroupUpdate, WaError> {
        let connection = self.connection().await?;
        connection
            .group_update_description(&req.group_jid, &req.description)
            .await
            .map_err(|e| WaError::protocol("Error updating group description", e))?;
        Ok(SUCCESS)
    }

    /// `image` is either a URL to download or a base64 body.
    pub async fn update_group_picture(
        &self,
        req: &GroupPictureRequest,
    ) -> Result<GroupUpdate, WaError> {
        let connection = self.connection().await?;
        let picture_error = |e: String| WaError::protocol("Error updating group picture", e);

        let image = if is_valid_url(&req.image) {
            let response = self
                .ctx
                .http
                .get(&req.image)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| picture_error(e.to_string()))?;
            response
                .bytes()
                .await
                .map_err(|e| picture_error(e.to_string()))?
                .to_vec()
        } else {
            decode_base64(&req.image)
                .map_err(|_| WaError::validation("image must be a URL or a base64 string"))?
        };

        connection
            .update_profile_picture(&req.group_jid, image)
            .await
            .map_err(|e| picture_error(e.to_string()))?;
        Ok(SUCCESS)
    }

    pub async fn find_group(&self, group_jid: &str) -> Result<Value, WaError> {
        let connection = self.connection().await?;
        connection
            .group_metadata(group_jid)
            .await
            .map_err(|e| WaError::not_found("Error fetching group", e))
    }

    pub async fn invite_code(&self, group_jid: &str) -> Result<InviteCode, WaError> {
        let connection = self.connection().await?;
        let code = connection
            .group_invite_code(group_jid)
            .await
            .map_err(|e| WaError::not_found("No invite code", e))?;
        Ok(invite_code(code))
    }

    pub async fn revoke_invite_code(&self, group_jid: &str) -> Result<RevokedInvite, WaError> {
        let connection = self.connection().await?;
        let code = connection
            .group_revoke_invite(group_jid)
            .await
            .map_err(|e| WaError::not_found("Revoke invite code failed", e))?;
        Ok(RevokedInvite {
            revoked: true,
            invite_code: code,
        })
    }

    pub async fn find_participants(&self, group_jid: &str) -> Result<Participants, WaError> {
        let metadata = self.find_group(group_jid).await?;
        Ok(Participants {
            participants: metadata
                .get("participants")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        })
    }

    pub async fn update_participants(
        &self,
        req: &UpdateParticipantsRequest,
    ) -> Result<ParticipantsUpdate, WaError> {
        let connection = self.connection().await?;
        let participants: Vec<String> = req.participants.iter().map(|p| create_jid(p)).collect();
        let result = connection
            .group_participants_update(&req.group_jid, &participants, req.action)
            .await
            .map_err(|e| WaError::protocol("Error updating participants", e))?;
        Ok(ParticipantsUpdate {
            update_participants: result,
        })
    }

    pub async fn leave_group(&self, group_jid: &str) -> Result<LeftGroup, WaError> {
        let connection = self.connection().await?;
        connection
            .group_leave(group_jid)
            .await
            .map_err(|e| WaError::protocol("Unable to leave the group", e))?;
        Ok(LeftGroup {
            group_jid: group_jid.to_string(),
            leave: true,
        })
    }
}
