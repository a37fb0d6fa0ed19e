//! `PostgreSQL` record backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    ChatRecord, ContactQuery, ContactRecord, MessageQuery, MessageRecord, MessageUpdateQuery,
    MessageUpdateRecord, RecordStore, StoreError,
};
use crate::db;

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_messages(&self, records: &[MessageRecord]) -> Result<u64, StoreError> {
        Ok(db::insert_messages(&self.pool, records).await?)
    }

    async fn existing_message_ids(
        &self,
        owner: &str,
        key_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        Ok(db::existing_message_ids(&self.pool, owner, key_ids).await?)
    }

    async fn find_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = db::find_messages(&self.pool, query).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_message_updates(
        &self,
        records: &[MessageUpdateRecord],
    ) -> Result<u64, StoreError> {
        Ok(db::insert_message_updates(&self.pool, records).await?)
    }

    async fn find_message_updates(
        &self,
        query: &MessageUpdateQuery,
    ) -> Result<Vec<MessageUpdateRecord>, StoreError> {
        let rows = db::find_message_updates(&self.pool, query).await?;
        Ok(rows
            .into_iter()
            .map(db::MessageUpdateRow::into_record)
            .collect())
    }

    async fn insert_contacts(&self, records: &[ContactRecord]) -> Result<u64, StoreError> {
        Ok(db::insert_contacts(&self.pool, records).await?)
    }

    async fn update_contacts(&self, records: &[ContactRecord]) -> Result<u64, StoreError> {
        // An upsert cannot touch the same row twice in one statement; last write wins.
        let mut latest: HashMap<(&str, &str), &ContactRecord> = HashMap::new();
        for record in records {
            latest.insert((record.owner.as_str(), record.id.as_str()), record);
        }
        let deduped: Vec<ContactRecord> = latest.into_values().cloned().collect();
        Ok(db::update_contacts(&self.pool, &deduped).await?)
    }

    async fn existing_contact_ids(
        &self,
        owner: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        Ok(db::existing_contact_ids(&self.pool, owner, ids).await?)
    }

    async fn find_contacts(&self, query: &ContactQuery) -> Result<Vec<ContactRecord>, StoreError> {
        let rows = db::find_contacts(&self.pool, query).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_chats(&self, records: &[ChatRecord]) -> Result<u64, StoreError> {
        Ok(db::insert_chats(&self.pool, records).await?)
    }

    async fn find_chats(&self, owner: &str) -> Result<Vec<ChatRecord>, StoreError> {
        let rows = db::find_chats(&self.pool, owner).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
