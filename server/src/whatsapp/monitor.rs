//! Instance Registry
//!
//! Owns every live [`WaInstance`] by name and tears instances down when they
//! signal a terminal close.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wr_common::ConnectionState;

use super::connection::Connector;
use super::error::WaError;
use super::instance::{
    ConnectionStatus, InstanceContext, InstanceInfo, QrPairing, RemovalSignal, WaInstance,
};
use crate::config::Config;
use crate::store::{is_valid_instance_name, Repository, SessionStore};
use crate::tasks::BackgroundTasks;
use crate::webhooks::{LocalWebhook, WebhookDispatcher, WebhookEvent};

/// How long `connect` waits for the first pairing challenge.
const QRCODE_WAIT: Duration = Duration::from_secs(2);

/// Collaborators every instance is built with.
pub struct MonitorDeps {
    pub connector: Arc<dyn Connector>,
    pub sessions: Arc<dyn SessionStore>,
    pub repository: Repository,
    pub webhooks: WebhookDispatcher,
    pub tasks: BackgroundTasks,
}

/// Outcome of a connect request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ConnectResponse {
    /// Pairing in progress; scan this.
    Qrcode(QrPairing),
    /// Already paired and connected (or mid-handshake without a challenge).
    State(InstanceState),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceState {
    pub instance_name: String,
    pub state: ConnectionState,
    pub status_reason: u16,
}

impl InstanceState {
    fn new(name: &str, status: ConnectionStatus) -> Self {
        Self {
            instance_name: name.to_string(),
            state: status.state,
            status_reason: status.status_reason,
        }
    }
}

pub struct WaMonitor {
    instances: DashMap<String, Arc<WaInstance>>,
    ctx: Arc<InstanceContext>,
}

impl std::fmt::Debug for WaMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaMonitor")
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}

impl WaMonitor {
    /// Build the registry and start its removal loop.
    pub fn start(deps: MonitorDeps, config: &Config) -> Arc<Self> {
        let (removals, signals) = mpsc::unbounded_channel();

        let http = reqwest::Client::builder()
            .timeout(config.webhook.timeout.max(Duration::from_secs(30)))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build media client, using defaults");
                reqwest::Client::new()
            });

        let ctx = Arc::new(InstanceContext {
            connector: deps.connector,
            sessions: deps.sessions,
            repository: deps.repository,
            webhooks: deps.webhooks,
            tasks: deps.tasks,
            http,
            session: config.session.clone(),
            reconnect: config.reconnect,
            browser: config.browser(),
            removals,
        });

        let monitor = Arc::new(Self {
            instances: DashMap::new(),
            ctx,
        });
        tokio::spawn(Self::removal_loop(Arc::downgrade(&monitor), signals));
        monitor
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.ctx.tasks
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Live instance by name.
    pub fn get(&self, name: &str) -> Result<Arc<WaInstance>, WaError> {
        self.instances
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| WaError::InstanceNotFound(name.to_string()))
    }

    /// Register a new instance. An empty name gets a generated one.
    pub async fn create_instance(
        &self,
        name: &str,
        webhook: Option<LocalWebhook>,
    ) -> Result<Arc<WaInstance>, WaError> {
        let name = if name.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            name.trim().to_string()
        };
        if !is_valid_instance_name(&name) {
            return Err(WaError::validation(format!("Invalid instance name \"{name}\"")));
        }

        let persisted = self
            .ctx
            .sessions
            .has_instance(&name)
            .await
            .map_err(WaError::Session)?;
        if persisted || self.instances.contains_key(&name) {
            return Err(WaError::AlreadyExists(name));
        }

        let instance = WaInstance::new(name.clone(), self.ctx.clone());
        if let Some(webhook) = webhook {
            instance.set_webhook(webhook).await?;
        }

        // Re-check under the map's entry lock; two concurrent creates race here.
        match self.instances.entry(name.clone()) {
            Entry::Occupied(_) => return Err(WaError::AlreadyExists(name)),
            Entry::Vacant(slot) => {
                slot.insert(instance.clone());
            }
        }

        instance
            .send_webhook(
                WebhookEvent::StatusInstance,
                json!({ "instance": name, "status": "created" }),
            )
            .await;
        info!(instance = %name, "Instance created");
        Ok(instance)
    }

    /// Start the session if closed and report the pairing challenge or state.
    pub async fn connect(&self, name: &str) -> Result<ConnectResponse, WaError> {
        let instance = self.get(name)?;
        let status = instance.connection_status().await;

        match status.state {
            ConnectionState::Close => {
                instance.start_or_retry().await?;
                Ok(ConnectResponse::Qrcode(
                    instance.wait_for_qrcode(QRCODE_WAIT).await,
                ))
            }
            ConnectionState::Connecting => Ok(ConnectResponse::Qrcode(instance.qrcode().await)),
            ConnectionState::Open => Ok(ConnectResponse::State(InstanceState::new(name, status))),
        }
    }

    pub async fn connection_state(&self, name: &str) -> Result<InstanceState, WaError> {
        let instance = self.get(name)?;
        Ok(InstanceState::new(name, instance.connection_status().await))
    }

    /// Summaries of every instance, sorted by name.
    pub async fn list(&self) -> Vec<InstanceInfo> {
        let instances: Vec<Arc<WaInstance>> =
            self.instances.iter().map(|e| e.value().clone()).collect();

        let mut infos = Vec::with_capacity(instances.len());
        for instance in instances {
            infos.push(instance.info().await);
        }
        infos.sort_by(|a, b| a.instance_name.cmp(&b.instance_name));
        infos
    }

    /// Log the account out; the resulting close removes the instance.
    pub async fn logout_instance(&self, name: &str) -> Result<(), WaError> {
        self.get(name)?.logout().await
    }

    /// Tear down and forget an instance, including its session artifacts.
    pub async fn delete_instance(&self, name: &str) -> Result<(), WaError> {
        let instance = self.get(name)?;
        instance.remove().await;
        self.forget(name).await;
        Ok(())
    }

    /// Restore every instance with persisted session state and connect it.
    pub async fn load_instances(&self) -> Result<usize, WaError> {
        let names = self
            .ctx
            .sessions
            .list_instances()
            .await
            .map_err(WaError::Session)?;

        let mut loaded = 0;
        for name in names {
            if self.instances.contains_key(&name) {
                continue;
            }
            let instance = WaInstance::new(name.clone(), self.ctx.clone());
            self.instances.insert(name.clone(), instance.clone());
            loaded += 1;

            if let Err(e) = instance.start_or_retry().await {
                warn!(instance = %name, error = %e, "Failed to restore session, retrying");
            }
        }

        info!(count = loaded, "Instances restored");
        Ok(loaded)
    }

    /// Close every session without logging out.
    pub async fn shutdown(&self) {
        let instances: Vec<Arc<WaInstance>> =
            self.instances.iter().map(|e| e.value().clone()).collect();
        for instance in instances {
            instance.shutdown().await;
        }
        self.ctx.tasks.drain().await;
    }

    /// Drop `name` from the registry and delete its persisted session.
    async fn forget(&self, name: &str) {
        if let Some((_, instance)) = self.instances.remove(name) {
            instance.shutdown().await;
        }
        if let Err(e) = self.ctx.sessions.delete_credentials(name).await {
            error!(instance = %name, error = %e, "Failed to delete credentials");
        }
        if let Err(e) = self.ctx.sessions.delete_webhook(name).await {
            error!(instance = %name, error = %e, "Failed to delete webhook");
        }
    }

    async fn removal_loop(
        monitor: Weak<Self>,
        mut signals: mpsc::UnboundedReceiver<RemovalSignal>,
    ) {
        while let Some(signal) = signals.recv().await {
            let Some(monitor) = monitor.upgrade() else {
                break;
            };
            info!(instance = %signal.instance, reason = ?signal.reason, "Removing instance");
            monitor.forget(&signal.instance).await;
        }
        debug!("Removal loop stopped");
    }
}
