//! Webhooks
//!
//! Best-effort HTTP POST fan-out of normalized events to the per-instance and
//! global sinks, gated by a static event catalog.

pub mod dispatch;
pub mod events;
pub mod types;

pub use dispatch::{is_valid_url, WebhookDispatcher};
pub use events::{EnabledEvents, WebhookEvent};
pub use types::{EventSource, GlobalWebhook, LocalWebhook, Sink};
