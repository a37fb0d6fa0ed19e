//! Server Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::webhooks::{EnabledEvents, GlobalWebhook};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    pub database: DatabaseConfig,

    /// Directory holding per-instance credential documents
    pub instance_dir: PathBuf,

    /// Directory holding persisted webhook documents
    pub store_dir: PathBuf,

    pub webhook: WebhookConfig,

    pub session: SessionConfig,

    pub reconnect: ReconnectConfig,
}

/// Record persistence settings.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Persist records and sessions in `PostgreSQL`
    pub enabled: bool,

    /// `PostgreSQL` connection URL (required when enabled)
    pub url: Option<String>,

    pub save: SaveDataConfig,
}

/// Per-record-kind persistence toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveDataConfig {
    pub instance: bool,
    pub new_message: bool,
    pub old_message: bool,
    pub message_update: bool,
    pub contacts: bool,
    pub chats: bool,
    pub contacts_update: bool,
}

impl Default for SaveDataConfig {
    fn default() -> Self {
        Self {
            instance: false,
            new_message: true,
            old_message: false,
            message_update: true,
            contacts: true,
            chats: false,
            contacts_update: false,
        }
    }
}

impl SaveDataConfig {
    /// Every kind enabled.
    pub const fn all() -> Self {
        Self {
            instance: true,
            new_message: true,
            old_message: true,
            message_update: true,
            contacts: true,
            chats: true,
            contacts_update: true,
        }
    }
}

/// Webhook sinks and event toggles.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub global: GlobalWebhook,

    /// Event types eligible for delivery (`WEBHOOK_EVENTS_<KEY>`)
    pub events: EnabledEvents,

    /// Per-request timeout (default: 10s)
    pub timeout: Duration,
}

/// Session negotiation settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Browser client name announced to the network
    pub phone_client: String,

    /// Browser name announced to the network
    pub phone_name: String,

    /// Pairing challenges offered before the instance is removed (default: 6)
    pub qrcode_limit: u32,

    /// Connect attempt ceiling (default: 60s)
    pub connect_timeout: Duration,

    /// Base URL of the protocol bridge (e.g., "ws://127.0.0.1:8085")
    pub bridge_url: String,
}

/// Reconnect backoff after a non-terminal close.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    pub base: Duration,
    pub max: Duration,
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_enabled = env_flag("DATABASE_ENABLED", false);
        let database_url = env::var("DATABASE_URL").ok();
        if database_enabled && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when DATABASE_ENABLED=true");
        }

        let defaults = SaveDataConfig::default();

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database: DatabaseConfig {
                enabled: database_enabled,
                url: database_url,
                save: SaveDataConfig {
                    instance: env_flag("DATABASE_SAVE_DATA_INSTANCE", defaults.instance),
                    new_message: env_flag("DATABASE_SAVE_DATA_NEW_MESSAGE", defaults.new_message),
                    old_message: env_flag("DATABASE_SAVE_DATA_OLD_MESSAGE", defaults.old_message),
                    message_update: env_flag(
                        "DATABASE_SAVE_DATA_MESSAGE_UPDATE",
                        defaults.message_update,
                    ),
                    contacts: env_flag("DATABASE_SAVE_DATA_CONTACTS", defaults.contacts),
                    chats: env_flag("DATABASE_SAVE_DATA_CHATS", defaults.chats),
                    contacts_update: env_flag(
                        "DATABASE_SAVE_DATA_CONTACTS_UPDATE",
                        defaults.contacts_update,
                    ),
                },
            },
            instance_dir: env::var("INSTANCE_DIR")
                .unwrap_or_else(|_| "instances".into())
                .into(),
            store_dir: env::var("STORE_DIR").unwrap_or_else(|_| "store".into()).into(),
            webhook: WebhookConfig {
                global: GlobalWebhook {
                    enabled: env_flag("WEBHOOK_GLOBAL_ENABLED", false),
                    url: env::var("WEBHOOK_GLOBAL_URL").ok().filter(|u| !u.is_empty()),
                },
                events: EnabledEvents::from_lookup(|key| {
                    env::var(format!("WEBHOOK_EVENTS_{key}"))
                        .ok()
                        .and_then(|v| parse_flag(&v))
                }),
                timeout: Duration::from_secs(env_parse("WEBHOOK_TIMEOUT_SECS", 10)?),
            },
            session: SessionConfig {
                phone_client: env::var("CONFIG_SESSION_PHONE_CLIENT")
                    .unwrap_or_else(|_| "WaRelay".into()),
                phone_name: env::var("CONFIG_SESSION_PHONE_NAME")
                    .unwrap_or_else(|_| "Chrome".into()),
                qrcode_limit: env_parse("QRCODE_LIMIT", 6)?,
                connect_timeout: Duration::from_secs(env_parse("CONNECT_TIMEOUT_SECS", 60)?),
                bridge_url: env::var("BRIDGE_URL")
                    .unwrap_or_else(|_| "ws://127.0.0.1:8085".into()),
            },
            reconnect: ReconnectConfig {
                base: Duration::from_millis(env_parse("RECONNECT_BACKOFF_BASE_MS", 1000)?),
                max: Duration::from_millis(env_parse("RECONNECT_BACKOFF_MAX_MS", 30_000)?),
            },
        })
    }

    /// Browser description sent while connecting: client, name, host release.
    pub fn browser(&self) -> [String; 3] {
        [
            self.session.phone_client.clone(),
            self.session.phone_name.clone(),
            std::env::consts::OS.to_string(),
        ]
    }

    /// Create a default configuration for testing.
    ///
    /// Records and sessions stay in memory or under a temporary directory,
    /// every webhook event is enabled and reconnects are near-immediate.
    #[must_use]
    pub fn default_for_test() -> Self {
        let tmp = std::env::temp_dir().join(format!("wr-server-test-{}", uuid::Uuid::new_v4()));
        Self {
            bind_address: "127.0.0.1:8080".into(),
            database: DatabaseConfig {
                enabled: false,
                url: None,
                save: SaveDataConfig::all(),
            },
            instance_dir: tmp.join("instances"),
            store_dir: tmp.join("store"),
            webhook: WebhookConfig {
                global: GlobalWebhook::default(),
                events: EnabledEvents::all(),
                timeout: Duration::from_secs(2),
            },
            session: SessionConfig {
                phone_client: "WaRelay".into(),
                phone_name: "Chrome".into(),
                qrcode_limit: 6,
                connect_timeout: Duration::from_secs(5),
                bridge_url: "ws://127.0.0.1:8085".into(),
            },
            reconnect: ReconnectConfig {
                base: Duration::from_millis(10),
                max: Duration::from_millis(50),
            },
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}
