//! Event Normalizer
//!
//! Turns chat, contact, message and presence events into records, applies
//! the dedup rules, persists what the save flags allow and republishes.
//! Persistence failures are logged; the webhook still goes out.

use std::collections::HashSet;

use tracing::{debug, warn};
use wr_common::jid::{has_device_suffix, is_status_broadcast};
use wr_common::{Chat, Contact, MessageSource, MessageStatus, MessageUpdate, WaMessage};

use super::connection::{ConnectionEvent, UpsertType};
use super::instance::WaInstance;
use crate::store::{ChatRecord, ContactRecord, MessageClass, MessageRecord, MessageUpdateRecord};
use crate::webhooks::WebhookEvent;

/// Normalize a live or synced message. `None` for protocol-internal or empty payloads.
pub fn message_record(
    message: &WaMessage,
    owner: &str,
    class: MessageClass,
    with_source: bool,
) -> Option<MessageRecord> {
    let content = message.content()?;
    Some(MessageRecord {
        key: message.key.clone(),
        push_name: message.push_name.clone(),
        message: content.clone(),
        message_timestamp: message.timestamp(),
        owner: owner.to_string(),
        source: with_source.then(|| MessageSource::from_message_id(&message.key.id)),
        class: Some(class),
    })
}

/// Normalize a status change. `None` for broadcast and device-scoped chats.
pub fn message_update_record(
    update: &MessageUpdate,
    owner: &str,
    now_ms: i64,
) -> Option<MessageUpdateRecord> {
    let key = &update.key;
    if is_status_broadcast(&key.remote_jid) || has_device_suffix(&key.remote_jid) {
        return None;
    }
    let status = update.update.status.and_then(MessageStatus::from_code);
    Some(MessageUpdateRecord {
        id: key.id.clone(),
        remote_jid: key.remote_jid.clone(),
        from_me: key.from_me,
        participant: key.participant.clone(),
        status,
        datetime: now_ms,
        owner: owner.to_string(),
    })
}

fn chat_records(chats: &[Chat], owner: &str) -> Vec<ChatRecord> {
    chats
        .iter()
        .map(|chat| ChatRecord {
            id: chat.id.clone(),
            owner: owner.to_string(),
        })
        .collect()
}

impl WaInstance {
    /// Route a category event to its handler.
    pub(super) async fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::ChatsSet { chats, is_latest } => {
                if is_latest {
                    self.on_chats(chats, WebhookEvent::ChatsSet).await;
                }
            }
            ConnectionEvent::ChatsUpsert(chats) => {
                self.on_chats(chats, WebhookEvent::ChatsUpsert).await;
            }
            ConnectionEvent::ChatsUpdate(chats) => {
                self.on_chats(chats, WebhookEvent::ChatsUpdate).await;
            }
            ConnectionEvent::ContactsUpsert(contacts) => self.on_contacts_upsert(contacts).await,
            ConnectionEvent::ContactsUpdate(contacts) => self.on_contacts_update(contacts).await,
            ConnectionEvent::MessagesSet { messages, .. } => self.on_messages_set(messages).await,
            ConnectionEvent::MessagesUpsert { messages, kind } => {
                if kind == UpsertType::Notify {
                    self.on_messages_upsert(messages).await;
                }
            }
            ConnectionEvent::MessagesUpdate(updates) => self.on_messages_update(updates).await,
            ConnectionEvent::PresenceUpdate(presence) => {
                self.send_webhook(WebhookEvent::PresenceUpdate, presence)
                    .await;
            }
            ConnectionEvent::ConnectionUpdate(_) | ConnectionEvent::CredsUpdate(_) => {}
        }
    }

    async fn on_chats(&self, chats: Vec<Chat>, event: WebhookEvent) {
        let owner = self.owner().await;
        let records = chat_records(&chats, &owner);
        let repo = &self.ctx.repository;

        if let Err(e) = repo.insert_chats(&records, repo.save().chats).await {
            warn!(instance = %self.name(), event = %event, error = %e, "Failed to persist chats");
        }
        self.send_webhook(event, records).await;
    }

    async fn contact_record(&self, contact: &Contact, owner: &str) -> ContactRecord {
        ContactRecord {
            id: contact.id.clone(),
            push_name: contact.display_name().map(str::to_string),
            profile_picture_url: self.profile_picture(&contact.id).await.profile_picture_url,
            owner: owner.to_string(),
        }
    }

    async fn on_contacts_upsert(&self, contacts: Vec<Contact>) {
        let owner = self.owner().await;
        let repo = &self.ctx.repository;

        let ids: Vec<String> = contacts.iter().map(|c| c.id.clone()).collect();
        let mut known = match repo.existing_contact_ids(&owner, &ids).await {
            Ok(known) => known,
            Err(e) => {
                warn!(instance = %self.name(), error = %e, "Failed to look up known contacts");
                HashSet::new()
            }
        };

        let mut batch = Vec::with_capacity(contacts.len());
        let mut fresh = Vec::new();
        for contact in &contacts {
            let record = self.contact_record(contact, &owner).await;
            // Known ids keep their stored fields.
            if known.insert(contact.id.clone()) {
                fresh.push(record.clone());
            }
            batch.push(record);
        }

        if let Err(e) = repo.insert_contacts(&fresh, repo.save().contacts).await {
            warn!(instance = %self.name(), error = %e, "Failed to persist contacts");
        }
        self.send_webhook(WebhookEvent::ContactsUpsert, batch).await;
    }

    async fn on_contacts_update(&self, contacts: Vec<Contact>) {
        let owner = self.owner().await;
        let repo = &self.ctx.repository;

        let mut records = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            records.push(self.contact_record(contact, &owner).await);
        }

        if let Err(e) = repo
            .update_contacts(&records, repo.save().contacts_update)
            .await
        {
            warn!(instance = %self.name(), error = %e, "Failed to update contacts");
        }
        self.send_webhook(WebhookEvent::ContactsUpdate, records).await;
    }

    async fn on_messages_set(&self, messages: Vec<WaMessage>) {
        let owner = self.owner().await;
        let repo = &self.ctx.repository;

        let ids: Vec<String> = messages.iter().map(|m| m.key.id.clone()).collect();
        let mut seen = match repo.existing_message_ids(&owner, &ids).await {
            Ok(seen) => seen,
            Err(e) => {
                warn!(instance = %self.name(), error = %e, "Failed to look up known messages");
                HashSet::new()
            }
        };

        let records: Vec<MessageRecord> = messages
            .iter()
            .filter_map(|m| message_record(m, &owner, MessageClass::OldMessage, false))
            .filter(|record| seen.insert(record.key.id.clone()))
            .collect();
        drop(messages);

        debug!(instance = %self.name(), count = records.len(), "History sync batch");
        if let Err(e) = repo
            .insert_messages(&records, repo.save().old_message)
            .await
        {
            warn!(instance = %self.name(), error = %e, "Failed to persist message history");
        }
        self.send_webhook(WebhookEvent::MessagesSet, records).await;
    }

    async fn on_messages_upsert(&self, messages: Vec<WaMessage>) {
        let owner = self.owner().await;
        let repo = &self.ctx.repository;

        for message in &messages {
            let Some(record) = message_record(message, &owner, MessageClass::NewMessage, true)
            else {
                continue;
            };
            debug!(
                instance = %self.name(),
                id = %record.key.id,
                remote_jid = %record.key.remote_jid,
                "Message received"
            );

            if let Err(e) = repo
                .insert_messages(std::slice::from_ref(&record), repo.save().new_message)
                .await
            {
                warn!(instance = %self.name(), error = %e, "Failed to persist message");
            }
            self.send_webhook(WebhookEvent::MessagesUpsert, record).await;
        }
    }

    async fn on_messages_update(&self, updates: Vec<MessageUpdate>) {
        let owner = self.owner().await;
        let repo = &self.ctx.repository;

        for update in &updates {
            let now = chrono::Utc::now().timestamp_millis();
            let Some(record) = message_update_record(update, &owner, now) else {
                debug!(instance = %self.name(), remote_jid = %update.key.remote_jid, "Status update skipped");
                continue;
            };

            if let Err(e) = repo
                .insert_message_updates(std::slice::from_ref(&record), repo.save().message_update)
                .await
            {
                warn!(instance = %self.name(), error = %e, "Failed to persist status update");
            }
            self.send_webhook(WebhookEvent::MessagesUpdate, record).await;
        }
    }
}
