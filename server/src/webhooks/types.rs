//! Webhook Types
//!
//! Sink configuration and the delivery envelope.

use serde::{Deserialize, Serialize};

use super::events::WebhookEvent;

/// Per-instance webhook, persisted as a document keyed by instance name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalWebhook {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
}

/// Process-wide webhook receiving events of every instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalWebhook {
    pub enabled: bool,
    pub url: Option<String>,
}

/// Body of every webhook POST.
#[derive(Debug, Serialize)]
pub struct WebhookEnvelope<'a> {
    pub event: WebhookEvent,
    pub instance: &'a str,
    pub data: serde_json::Value,
}

/// Identifies the instance an event belongs to.
#[derive(Debug, Clone, Copy)]
pub struct EventSource<'a> {
    pub instance: &'a str,
    /// Resolved account id, sent as the `owner` query parameter.
    pub owner: Option<&'a str>,
    pub local: Option<&'a LocalWebhook>,
}

/// Which sink a delivery went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Local,
    Global,
}

impl Sink {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }
}
