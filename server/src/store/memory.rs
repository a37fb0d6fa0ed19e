//! In-process record backend with the same uniqueness rules as `PostgreSQL`.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    ChatRecord, ContactQuery, ContactRecord, MessageQuery, MessageRecord, MessageUpdateQuery,
    MessageUpdateRecord, RecordStore, StoreError,
};

#[derive(Debug, Default)]
struct Tables {
    messages: Vec<MessageRecord>,
    message_updates: Vec<MessageUpdateRecord>,
    contacts: Vec<ContactRecord>,
    chats: Vec<ChatRecord>,
}

/// Record store kept in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.tables().messages.clone()
    }

    pub fn message_updates(&self) -> Vec<MessageUpdateRecord> {
        self.tables().message_updates.clone()
    }

    pub fn contacts(&self) -> Vec<ContactRecord> {
        self.tables().contacts.clone()
    }

    pub fn chats(&self) -> Vec<ChatRecord> {
        self.tables().chats.clone()
    }
}

fn limited<T>(rows: impl Iterator<Item = T>, limit: Option<i64>) -> Vec<T> {
    match limit.and_then(|l| usize::try_from(l).ok()) {
        Some(limit) => rows.take(limit).collect(),
        None => rows.collect(),
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_messages(&self, records: &[MessageRecord]) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let mut inserted = 0;
        for record in records {
            let duplicate = tables
                .messages
                .iter()
                .any(|m| m.owner == record.owner && m.key.id == record.key.id);
            if !duplicate {
                tables.messages.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn existing_message_ids(
        &self,
        owner: &str,
        key_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.owner == owner && key_ids.contains(&m.key.id))
            .map(|m| m.key.id.clone())
            .collect())
    }

    async fn find_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>, StoreError> {
        let tables = self.tables();
        let rows = tables.messages.iter().filter(|m| {
            m.owner == query.owner
                && query.key_id.as_ref().is_none_or(|id| &m.key.id == id)
                && query
                    .remote_jid
                    .as_ref()
                    .is_none_or(|jid| &m.key.remote_jid == jid)
                && query.from_me.is_none_or(|from_me| m.key.from_me == from_me)
                && query
                    .participant
                    .as_ref()
                    .is_none_or(|p| m.key.participant.as_ref() == Some(p))
        });
        Ok(limited(rows.cloned(), query.limit))
    }

    async fn insert_message_updates(
        &self,
        records: &[MessageUpdateRecord],
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        tables.message_updates.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn find_message_updates(
        &self,
        query: &MessageUpdateQuery,
    ) -> Result<Vec<MessageUpdateRecord>, StoreError> {
        let tables = self.tables();
        let rows = tables.message_updates.iter().filter(|u| {
            u.owner == query.owner
                && query.id.as_ref().is_none_or(|id| &u.id == id)
                && query
                    .remote_jid
                    .as_ref()
                    .is_none_or(|jid| &u.remote_jid == jid)
        });
        Ok(limited(rows.cloned(), query.limit))
    }

    async fn insert_contacts(&self, records: &[ContactRecord]) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let mut inserted = 0;
        for record in records {
            let known = tables
                .contacts
                .iter()
                .any(|c| c.owner == record.owner && c.id == record.id);
            if !known {
                tables.contacts.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn update_contacts(&self, records: &[ContactRecord]) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        for record in records {
            match tables
                .contacts
                .iter_mut()
                .find(|c| c.owner == record.owner && c.id == record.id)
            {
                Some(existing) => *existing = record.clone(),
                None => tables.contacts.push(record.clone()),
            }
        }
        Ok(records.len() as u64)
    }

    async fn existing_contact_ids(
        &self,
        owner: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .contacts
            .iter()
            .filter(|c| c.owner == owner && ids.contains(&c.id))
            .map(|c| c.id.clone())
            .collect())
    }

    async fn find_contacts(&self, query: &ContactQuery) -> Result<Vec<ContactRecord>, StoreError> {
        let tables = self.tables();
        let rows = tables.contacts.iter().filter(|c| {
            c.owner == query.owner && query.id.as_ref().is_none_or(|id| &c.id == id)
        });
        Ok(limited(rows.cloned(), query.limit))
    }

    async fn insert_chats(&self, records: &[ChatRecord]) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let mut inserted = 0;
        for record in records {
            if !tables.chats.contains(record) {
                tables.chats.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn find_chats(&self, owner: &str) -> Result<Vec<ChatRecord>, StoreError> {
        Ok(self
            .tables()
            .chats
            .iter()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect())
    }
}
