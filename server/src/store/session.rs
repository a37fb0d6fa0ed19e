//! Session Store
//!
//! Credential material and persisted per-instance documents, keyed by
//! instance name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use super::StoreError;
use crate::db;
use crate::webhooks::LocalWebhook;

const CREDENTIALS_FILE: &str = "creds.json";

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stored credentials, `None` when the instance never paired.
    async fn load_credentials(&self, instance: &str) -> Result<Option<Value>, StoreError>;

    async fn save_credentials(&self, instance: &str, credentials: &Value)
        -> Result<(), StoreError>;

    async fn delete_credentials(&self, instance: &str) -> Result<(), StoreError>;

    /// Instances with persisted session state.
    async fn list_instances(&self) -> Result<Vec<String>, StoreError>;

    async fn has_instance(&self, instance: &str) -> Result<bool, StoreError> {
        Ok(self.list_instances().await?.iter().any(|i| i == instance))
    }

    async fn load_webhook(&self, instance: &str) -> Result<Option<LocalWebhook>, StoreError>;

    async fn save_webhook(&self, instance: &str, webhook: &LocalWebhook) -> Result<(), StoreError>;

    async fn delete_webhook(&self, instance: &str) -> Result<(), StoreError>;
}

/// JSON documents on disk:
/// `<instance_dir>/<name>/creds.json` and `<store_dir>/webhook/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    instance_dir: PathBuf,
    webhook_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(instance_dir: impl Into<PathBuf>, store_dir: impl AsRef<Path>) -> Self {
        Self {
            instance_dir: instance_dir.into(),
            webhook_dir: store_dir.as_ref().join("webhook"),
        }
    }

    fn instance_path(&self, instance: &str) -> Result<PathBuf, StoreError> {
        check_name(instance)?;
        Ok(self.instance_dir.join(instance))
    }

    fn webhook_path(&self, instance: &str) -> Result<PathBuf, StoreError> {
        check_name(instance)?;
        Ok(self.webhook_dir.join(format!("{instance}.json")))
    }
}

/// Instance names become path segments; reject anything that could escape.
/// Whether `instance` can key a session directory.
pub fn is_valid_instance_name(instance: &str) -> bool {
    !instance.is_empty()
        && instance != "."
        && instance != ".."
        && !instance.contains(['/', '\\', '\0'])
}

fn check_name(instance: &str) -> Result<(), StoreError> {
    if is_valid_instance_name(instance) {
        Ok(())
    } else {
        Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid instance name: {instance:?}"),
        )
        .into())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

fn ignore_missing(result: std::io::Result<()>) -> Result<(), StoreError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load_credentials(&self, instance: &str) -> Result<Option<Value>, StoreError> {
        read_json(&self.instance_path(instance)?.join(CREDENTIALS_FILE)).await
    }

    async fn save_credentials(
        &self,
        instance: &str,
        credentials: &Value,
    ) -> Result<(), StoreError> {
        let path = self.instance_path(instance)?.join(CREDENTIALS_FILE);
        write_json(&path, credentials).await?;
        debug!(instance = %instance, path = %path.display(), "Credentials saved");
        Ok(())
    }

    async fn delete_credentials(&self, instance: &str) -> Result<(), StoreError> {
        let dir = self.instance_path(instance)?;
        ignore_missing(tokio::fs::remove_dir_all(dir).await)
    }

    async fn list_instances(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.instance_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has_instance(&self, instance: &str) -> Result<bool, StoreError> {
        if check_name(instance).is_err() {
            return Ok(false);
        }
        Ok(tokio::fs::metadata(self.instance_dir.join(instance))
            .await
            .is_ok_and(|m| m.is_dir()))
    }

    async fn load_webhook(&self, instance: &str) -> Result<Option<LocalWebhook>, StoreError> {
        read_json(&self.webhook_path(instance)?).await
    }

    async fn save_webhook(&self, instance: &str, webhook: &LocalWebhook) -> Result<(), StoreError> {
        write_json(&self.webhook_path(instance)?, webhook).await
    }

    async fn delete_webhook(&self, instance: &str) -> Result<(), StoreError> {
        let path = self.webhook_path(instance)?;
        ignore_missing(tokio::fs::remove_file(path).await)
    }
}

/// Session documents in `instance_credentials` and `instance_webhooks`.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load_credentials(&self, instance: &str) -> Result<Option<Value>, StoreError> {
        Ok(db::find_credentials(&self.pool, instance).await?)
    }

    async fn save_credentials(
        &self,
        instance: &str,
        credentials: &Value,
    ) -> Result<(), StoreError> {
        Ok(db::save_credentials(&self.pool, instance, credentials).await?)
    }

    async fn delete_credentials(&self, instance: &str) -> Result<(), StoreError> {
        Ok(db::delete_credentials(&self.pool, instance).await?)
    }

    async fn list_instances(&self) -> Result<Vec<String>, StoreError> {
        Ok(db::list_credential_instances(&self.pool).await?)
    }

    async fn load_webhook(&self, instance: &str) -> Result<Option<LocalWebhook>, StoreError> {
        Ok(db::find_webhook(&self.pool, instance).await?.map(Into::into))
    }

    async fn save_webhook(&self, instance: &str, webhook: &LocalWebhook) -> Result<(), StoreError> {
        Ok(db::save_webhook(&self.pool, instance, webhook.enabled, &webhook.url).await?)
    }

    async fn delete_webhook(&self, instance: &str) -> Result<(), StoreError> {
        Ok(db::delete_webhook(&self.pool, instance).await?)
    }
}
