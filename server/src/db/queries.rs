//! Database Queries
//!
//! Runtime-checked queries for records and session documents.

use std::collections::HashSet;

use serde_json::Value;
use sqlx::{PgPool, QueryBuilder};
use tracing::error;

use super::models::{ChatRow, ContactRow, MessageRow, MessageUpdateRow, WebhookRow};
use crate::store::{
    ChatRecord, ContactQuery, ContactRecord, MessageClass, MessageQuery, MessageRecord,
    MessageUpdateQuery, MessageUpdateRecord,
};

/// Log a failed query with context before propagating it.
macro_rules! db_error {
    ($query:expr) => {
        |e| {
            error!(query = $query, error = %e, "Database query failed");
            e
        }
    };
    ($query:expr, $($field:tt)*) => {
        |e| {
            error!(query = $query, $($field)*, error = %e, "Database query failed");
            e
        }
    };
}

// ============================================================================
// Messages
// ============================================================================

/// Insert messages, ignoring keys already stored for the same owner.
pub async fn insert_messages(pool: &PgPool, records: &[MessageRecord]) -> sqlx::Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO messages \
         (owner, key_id, remote_jid, from_me, participant, push_name, message, \
          message_timestamp, source, class) ",
    );
    qb.push_values(records, |mut b, m| {
        b.push_bind(&m.owner)
            .push_bind(&m.key.id)
            .push_bind(&m.key.remote_jid)
            .push_bind(m.key.from_me)
            .push_bind(&m.key.participant)
            .push_bind(&m.push_name)
            .push_bind(&m.message)
            .push_bind(m.message_timestamp)
            .push_bind(m.source.map(|s| s.as_str()))
            .push_bind(m.class.unwrap_or(MessageClass::NewMessage).as_str());
    });
    qb.push(" ON CONFLICT (owner, key_id) DO NOTHING");

    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(db_error!("insert_messages", batch = records.len()))?;
    Ok(result.rows_affected())
}

/// Key ids among `key_ids` already stored for `owner`.
pub async fn existing_message_ids(
    pool: &PgPool,
    owner: &str,
    key_ids: &[String],
) -> sqlx::Result<HashSet<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT key_id FROM messages WHERE owner = $1 AND key_id = ANY($2)")
            .bind(owner)
            .bind(key_ids)
            .fetch_all(pool)
            .await
            .map_err(db_error!("existing_message_ids", owner = %owner))?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Find messages for an owner, newest first.
pub async fn find_messages(pool: &PgPool, query: &MessageQuery) -> sqlx::Result<Vec<MessageRow>> {
    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "SELECT owner, key_id, remote_jid, from_me, participant, push_name, message, \
         message_timestamp, source, class FROM messages WHERE owner = ",
    );
    qb.push_bind(&query.owner);
    if let Some(key_id) = &query.key_id {
        qb.push(" AND key_id = ").push_bind(key_id);
    }
    if let Some(remote_jid) = &query.remote_jid {
        qb.push(" AND remote_jid = ").push_bind(remote_jid);
    }
    if let Some(from_me) = query.from_me {
        qb.push(" AND from_me = ").push_bind(from_me);
    }
    if let Some(participant) = &query.participant {
        qb.push(" AND participant = ").push_bind(participant);
    }
    qb.push(" ORDER BY message_timestamp DESC, id DESC");
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    qb.build_query_as::<MessageRow>()
        .fetch_all(pool)
        .await
        .map_err(db_error!("find_messages", owner = %query.owner))
}

// ============================================================================
// Message Updates
// ============================================================================

pub async fn insert_message_updates(
    pool: &PgPool,
    records: &[MessageUpdateRecord],
) -> sqlx::Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO message_updates \
         (owner, message_id, remote_jid, from_me, participant, status, datetime) ",
    );
    qb.push_values(records, |mut b, u| {
        b.push_bind(&u.owner)
            .push_bind(&u.id)
            .push_bind(&u.remote_jid)
            .push_bind(u.from_me)
            .push_bind(&u.participant)
            .push_bind(u.status.map(|s| s.as_str()))
            .push_bind(u.datetime);
    });

    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(db_error!("insert_message_updates", batch = records.len()))?;
    Ok(result.rows_affected())
}

pub async fn find_message_updates(
    pool: &PgPool,
    query: &MessageUpdateQuery,
) -> sqlx::Result<Vec<MessageUpdateRow>> {
    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "SELECT owner, message_id, remote_jid, from_me, participant, status, datetime \
         FROM message_updates WHERE owner = ",
    );
    qb.push_bind(&query.owner);
    if let Some(id) = &query.id {
        qb.push(" AND message_id = ").push_bind(id);
    }
    if let Some(remote_jid) = &query.remote_jid {
        qb.push(" AND remote_jid = ").push_bind(remote_jid);
    }
    qb.push(" ORDER BY datetime, id");
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    qb.build_query_as::<MessageUpdateRow>()
        .fetch_all(pool)
        .await
        .map_err(db_error!("find_message_updates", owner = %query.owner))
}

// ============================================================================
// Contacts & Chats
// ============================================================================

/// Insert contacts not yet known for their owner.
pub async fn insert_contacts(pool: &PgPool, records: &[ContactRecord]) -> sqlx::Result<u64> {
    upsert_contacts(pool, records, false).await
}

/// Insert or overwrite contacts.
pub async fn update_contacts(pool: &PgPool, records: &[ContactRecord]) -> sqlx::Result<u64> {
    upsert_contacts(pool, records, true).await
}

async fn upsert_contacts(
    pool: &PgPool,
    records: &[ContactRecord],
    overwrite: bool,
) -> sqlx::Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<'_, sqlx::Postgres> =
        QueryBuilder::new("INSERT INTO contacts (owner, id, push_name, profile_picture_url) ");
    qb.push_values(records, |mut b, c| {
        b.push_bind(&c.owner)
            .push_bind(&c.id)
            .push_bind(&c.push_name)
            .push_bind(&c.profile_picture_url);
    });
    if overwrite {
        qb.push(
            " ON CONFLICT (owner, id) DO UPDATE SET push_name = EXCLUDED.push_name, \
             profile_picture_url = EXCLUDED.profile_picture_url, updated_at = NOW()",
        );
    } else {
        qb.push(" ON CONFLICT (owner, id) DO NOTHING");
    }

    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(db_error!("upsert_contacts", batch = records.len(), overwrite = overwrite))?;
    Ok(result.rows_affected())
}

pub async fn existing_contact_ids(
    pool: &PgPool,
    owner: &str,
    ids: &[String],
) -> sqlx::Result<HashSet<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT id FROM contacts WHERE owner = $1 AND id = ANY($2)")
            .bind(owner)
            .bind(ids)
            .fetch_all(pool)
            .await
            .map_err(db_error!("existing_contact_ids", owner = %owner))?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn find_contacts(pool: &PgPool, query: &ContactQuery) -> sqlx::Result<Vec<ContactRow>> {
    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "SELECT owner, id, push_name, profile_picture_url FROM contacts WHERE owner = ",
    );
    qb.push_bind(&query.owner);
    if let Some(id) = &query.id {
        qb.push(" AND id = ").push_bind(id);
    }
    qb.push(" ORDER BY id");
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    qb.build_query_as::<ContactRow>()
        .fetch_all(pool)
        .await
        .map_err(db_error!("find_contacts", owner = %query.owner))
}

pub async fn insert_chats(pool: &PgPool, records: &[ChatRecord]) -> sqlx::Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new("INSERT INTO chats (owner, id) ");
    qb.push_values(records, |mut b, c| {
        b.push_bind(&c.owner).push_bind(&c.id);
    });
    qb.push(" ON CONFLICT (owner, id) DO NOTHING");

    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(db_error!("insert_chats", batch = records.len()))?;
    Ok(result.rows_affected())
}

pub async fn find_chats(pool: &PgPool, owner: &str) -> sqlx::Result<Vec<ChatRow>> {
    sqlx::query_as::<_, ChatRow>("SELECT owner, id FROM chats WHERE owner = $1 ORDER BY id")
        .bind(owner)
        .fetch_all(pool)
        .await
        .map_err(db_error!("find_chats", owner = %owner))
}

// ============================================================================
// Session Documents
// ============================================================================

pub async fn find_credentials(pool: &PgPool, instance: &str) -> sqlx::Result<Option<Value>> {
    let row: Option<(Value,)> =
        sqlx::query_as("SELECT credentials FROM instance_credentials WHERE instance = $1")
            .bind(instance)
            .fetch_optional(pool)
            .await
            .map_err(db_error!("find_credentials", instance = %instance))?;
    Ok(row.map(|(creds,)| creds))
}

pub async fn save_credentials(pool: &PgPool, instance: &str, credentials: &Value) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO instance_credentials (instance, credentials) VALUES ($1, $2) \
         ON CONFLICT (instance) DO UPDATE SET credentials = EXCLUDED.credentials, updated_at = NOW()",
    )
    .bind(instance)
    .bind(credentials)
    .execute(pool)
    .await
    .map_err(db_error!("save_credentials", instance = %instance))?;
    Ok(())
}

pub async fn delete_credentials(pool: &PgPool, instance: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM instance_credentials WHERE instance = $1")
        .bind(instance)
        .execute(pool)
        .await
        .map_err(db_error!("delete_credentials", instance = %instance))?;
    Ok(())
}

pub async fn list_credential_instances(pool: &PgPool) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT instance FROM instance_credentials ORDER BY instance")
            .fetch_all(pool)
            .await
            .map_err(db_error!("list_credential_instances"))?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

pub async fn find_webhook(pool: &PgPool, instance: &str) -> sqlx::Result<Option<WebhookRow>> {
    sqlx::query_as::<_, WebhookRow>(
        "SELECT instance, enabled, url FROM instance_webhooks WHERE instance = $1",
    )
    .bind(instance)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("find_webhook", instance = %instance))
}

pub async fn save_webhook(pool: &PgPool, instance: &str, enabled: bool, url: &str) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO instance_webhooks (instance, enabled, url) VALUES ($1, $2, $3) \
         ON CONFLICT (instance) DO UPDATE SET enabled = EXCLUDED.enabled, url = EXCLUDED.url, \
         updated_at = NOW()",
    )
    .bind(instance)
    .bind(enabled)
    .bind(url)
    .execute(pool)
    .await
    .map_err(db_error!("save_webhook", instance = %instance))?;
    Ok(())
}

pub async fn delete_webhook(pool: &PgPool, instance: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM instance_webhooks WHERE instance = $1")
        .bind(instance)
        .execute(pool)
        .await
        .map_err(db_error!("delete_webhook", instance = %instance))?;
    Ok(())
}
