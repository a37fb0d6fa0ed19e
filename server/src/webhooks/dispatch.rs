//! Webhook Event Dispatch
//!
//! Single-attempt delivery of events to the per-instance and global sinks.
//! Failures are logged and never reach the caller.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, warn};

use super::events::{EnabledEvents, WebhookEvent};
use super::types::{EventSource, GlobalWebhook, Sink, WebhookEnvelope};
use crate::config::WebhookConfig;

/// Whether `url` is an absolute http(s) URL with a host.
pub fn is_valid_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

/// Delivers normalized events to configured sinks.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    global: GlobalWebhook,
    events: EnabledEvents,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> Self {
        Self::from_parts(config.global.clone(), config.events.clone(), config.timeout)
    }

    pub fn from_parts(global: GlobalWebhook, events: EnabledEvents, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build webhook client, using defaults");
                reqwest::Client::new()
            });

        Self {
            client,
            global,
            events,
        }
    }

    pub const fn events(&self) -> &EnabledEvents {
        &self.events
    }

    /// Deliver `data` under `event` to every eligible sink.
    ///
    /// Returns the sinks a POST was attempted against. Disabled event types
    /// produce no attempt at all.
    pub async fn dispatch<T: Serialize>(
        &self,
        source: EventSource<'_>,
        event: WebhookEvent,
        data: T,
    ) -> Vec<Sink> {
        if !self.events.is_enabled(event) {
            return Vec::new();
        }

        let data = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                error!(
                    instance = %source.instance,
                    event = %event,
                    "Failed to serialize webhook payload: {}", e
                );
                return Vec::new();
            }
        };

        let envelope = WebhookEnvelope {
            event,
            instance: source.instance,
            data,
        };

        let mut attempted = Vec::with_capacity(2);

        if let Some(local) = source.local {
            if local.enabled && is_valid_url(&local.url) {
                self.deliver(Sink::Local, &local.url, source.owner, &envelope)
                    .await;
                attempted.push(Sink::Local);
            }
        }

        if self.global.enabled {
            if let Some(url) = self.global.url.as_deref().filter(|u| is_valid_url(u)) {
                self.deliver(Sink::Global, url, source.owner, &envelope)
                    .await;
                attempted.push(Sink::Global);
            }
        }

        // Release the payload as soon as delivery is over.
        drop(envelope);
        attempted
    }

    async fn deliver(
        &self,
        sink: Sink,
        url: &str,
        owner: Option<&str>,
        envelope: &WebhookEnvelope<'_>,
    ) {
        let mut request = self.client.post(url).json(envelope);
        if let Some(owner) = owner {
            request = request.query(&[("owner", owner)]);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(
                    instance = %envelope.instance,
                    event = %envelope.event,
                    sink = sink.as_str(),
                    "Webhook delivered"
                );
            }
            Ok(resp) => {
                warn!(
                    instance = %envelope.instance,
                    event = %envelope.event,
                    sink = sink.as_str(),
                    status = resp.status().as_u16(),
                    "Webhook sink rejected delivery"
                );
            }
            Err(e) => {
                warn!(
                    instance = %envelope.instance,
                    event = %envelope.event,
                    sink = sink.as_str(),
                    error = %e,
                    "Webhook delivery failed"
                );
            }
        }
    }
}
