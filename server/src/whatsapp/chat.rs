//! Chat Operations
//!
//! Number lookups, read receipts, archiving and the owner-scoped store queries.

use serde::Serialize;
use serde_json::json;
use tracing::debug;
use wr_common::jid::{create_jid, is_group_jid, is_user_jid};
use wr_common::MessageKey;

use super::dto::{
    ArchiveChatRequest, FindContactsRequest, FindMessagesRequest, FindStatusRequest,
    LastMessage,
};
use super::error::WaError;
use super::instance::WaInstance;
use crate::store::{
    ContactQuery, ContactRecord, MessageQuery, MessageRecord, MessageUpdateQuery,
    MessageUpdateRecord,
};

/// Whether a number is registered on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberStatus {
    pub exists: bool,
    pub jid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadReceipt {
    pub message: &'static str,
    pub read: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedChat {
    pub chat_id: String,
    pub archived: bool,
}

/// Keys a read receipt may be sent for: groups and user chats only.
pub fn readable_keys(keys: &[MessageKey]) -> Vec<MessageKey> {
    keys.iter()
        .filter(|key| is_group_jid(&key.remote_jid) || is_user_jid(&key.remote_jid))
        .cloned()
        .collect()
}

/// Default a missing timestamp to `now_secs`.
pub fn with_timestamp(last: &LastMessage, now_secs: i64) -> LastMessage {
    let mut last = last.clone();
    if last.message_timestamp.is_none() {
        last.message_timestamp = Some(now_secs.into());
    }
    last
}

impl WaInstance {
    pub async fn whatsapp_number(&self, numbers: &[String]) -> Result<Vec<NumberStatus>, WaError> {
        let connection = self.connection().await?;

        let mut results = Vec::with_capacity(numbers.len());
        for number in numbers {
            let jid = create_jid(number);
            let status = match connection.on_whatsapp(&jid).await {
                Ok(found) => found
                    .into_iter()
                    .next()
                    .map(|hit| NumberStatus {
                        exists: hit.exists,
                        jid: hit.jid,
                    })
                    .unwrap_or(NumberStatus {
                        exists: false,
                        jid: number.clone(),
                    }),
                Err(e) => {
                    debug!(instance = %self.name(), number = %number, error = %e, "Number lookup failed");
                    NumberStatus {
                        exists: false,
                        jid: number.clone(),
                    }
                }
            };
            results.push(status);
        }
        Ok(results)
    }

    pub async fn mark_message_as_read(&self, keys: &[MessageKey]) -> Result<ReadReceipt, WaError> {
        let connection = self.connection().await?;
        let keys = readable_keys(keys);
        connection
            .read_messages(&keys)
            .await
            .map_err(|e| WaError::protocol("Read messages fail", e))?;
        Ok(ReadReceipt {
            message: "Read messages",
            read: "success",
        })
    }

    pub async fn archive_chat(&self, req: &ArchiveChatRequest) -> Result<ArchivedChat, WaError> {
        let connection = self.connection().await?;
        let last = with_timestamp(&req.last_message, chrono::Utc::now().timestamp());
        let chat_id = last.key.remote_jid.clone();

        connection
            .chat_modify(
                &chat_id,
                json!({ "archive": req.archive, "lastMessages": [last] }),
            )
            .await
            .map_err(|e| {
                WaError::protocol(
                    "Error archiving chat",
                    format!("{e}; chat {chat_id}"),
                )
            })?;

        Ok(ArchivedChat {
            chat_id,
            archived: true,
        })
    }

    pub async fn fetch_contacts(
        &self,
        req: &FindContactsRequest,
    ) -> Result<Vec<ContactRecord>, WaError> {
        let query = ContactQuery {
            owner: self.owner().await,
            id: req.filter.id.clone(),
            limit: req.limit,
        };
        Ok(self.ctx.repository.find_contacts(&query).await?)
    }

    pub async fn fetch_messages(
        &self,
        req: &FindMessagesRequest,
    ) -> Result<Vec<MessageRecord>, WaError> {
        let key = &req.filter.key;
        let query = MessageQuery {
            owner: self.owner().await,
            key_id: key.id.clone(),
            remote_jid: key.remote_jid.clone(),
            from_me: key.from_me,
            participant: key.participant.clone(),
            limit: req.limit,
        };
        Ok(self.ctx.repository.find_messages(&query).await?)
    }

    pub async fn find_status_message(
        &self,
        req: &FindStatusRequest,
    ) -> Result<Vec<MessageUpdateRecord>, WaError> {
        let query = MessageUpdateQuery {
            owner: self.owner().await,
            id: req.filter.id.clone(),
            remote_jid: req.filter.remote_jid.clone(),
            limit: req.limit,
        };
        Ok(self.ctx.repository.find_message_updates(&query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(remote_jid: &str) -> MessageKey {
        MessageKey {
            id: "A".into(),
            remote_jid: remote_jid.into(),
            from_me: false,
            participant: None,
        }
    }

    #[test]
    fn receipts_skip_broadcasts() {
        let keys = [
            key("5511999999999@s.whatsapp.net"),
            key("status@broadcast"),
            key("120363000000000000@g.us"),
        ];
        let readable = readable_keys(&keys);
        assert_eq!(readable.len(), 2);
        assert!(readable.iter().all(|k| k.remote_jid != "status@broadcast"));
    }

    #[test]
    fn archive_timestamp_defaults_to_now() {
        let last = LastMessage {
            key: key("5511999999999@s.whatsapp.net"),
            message_timestamp: None,
        };
        let filled = with_timestamp(&last, 1_700_000_123);
        assert_eq!(
            filled.message_timestamp.map(|t| t.as_i64()),
            Some(1_700_000_123)
        );

        let given = LastMessage {
            message_timestamp: Some(5.into()),
            ..last
        };
        assert_eq!(
            with_timestamp(&given, 9).message_timestamp.map(|t| t.as_i64()),
            Some(5)
        );
    }
}
