//! Instance Lifecycle
//!
//! One [`WaInstance`] supervises the session of one account: it opens the
//! connection, tracks pairing and connection state, reconnects after
//! non-terminal closes and signals the registry when the instance must go.
//!
//! Every connect attempt gets a generation number. Events from an older
//! generation are ignored, so a replaced connection can never drive state.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::{debug, error, info, warn};
use wr_common::jid::{create_jid, strip_device};
use wr_common::{
    ConnectionState, ConnectionUpdate, STATUS_CONNECTION_CLOSED, STATUS_LOGGED_OUT, STATUS_OK,
};

use super::connection::{ConnectOptions, Connection, ConnectionEvent, Connector};
use super::error::{ConnectionError, WaError};
use super::qrcode;
use crate::config::{ReconnectConfig, SessionConfig};
use crate::store::{Repository, SessionStore};
use crate::tasks::BackgroundTasks;
use crate::webhooks::{EventSource, LocalWebhook, WebhookDispatcher, WebhookEvent};

/// Why an instance asked to be removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Authenticated logout (close reason 401).
    LoggedOut,
    /// Pairing challenges ran out before a scan.
    QrLimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalSignal {
    pub instance: String,
    pub reason: RemovalReason,
}

/// Collaborators shared by every instance.
pub struct InstanceContext {
    pub connector: Arc<dyn Connector>,
    pub sessions: Arc<dyn SessionStore>,
    pub repository: Repository,
    pub webhooks: WebhookDispatcher,
    pub tasks: BackgroundTasks,
    /// Client for fetching remote media on behalf of callers.
    pub http: reqwest::Client,
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
    pub browser: [String; 3],
    pub removals: mpsc::UnboundedSender<RemovalSignal>,
}

/// Current state plus the reason attached to the last transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub status_reason: u16,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Close,
            status_reason: STATUS_OK,
        }
    }
}

/// Pairing progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QrPairing {
    #[serde(skip)]
    pub count: u32,
    pub code: Option<String>,
    pub base64: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceState {
    pub wuid: Option<String>,
    pub connection: ConnectionStatus,
    pub qrcode: QrPairing,
    pub profile_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub webhook: LocalWebhook,
}

/// Public summary for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub instance_name: String,
    pub owner: Option<String>,
    pub profile_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub status: ConnectionState,
}

/// Profile picture lookup result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePicture {
    pub wuid: String,
    pub profile_picture_url: Option<String>,
}

struct ActiveConnection {
    generation: u64,
    connection: Arc<dyn Connection>,
}

pub struct WaInstance {
    name: String,
    pub(super) ctx: Arc<InstanceContext>,
    /// Single-flight guard for `start`.
    start_lock: Mutex<()>,
    generation: AtomicU64,
    client: RwLock<Option<ActiveConnection>>,
    state: RwLock<InstanceState>,
    qr_ready: Notify,
    reconnect_attempt: AtomicU32,
    removed: AtomicBool,
}

impl std::fmt::Debug for WaInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaInstance")
            .field("name", &self.name)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("removed", &self.is_removed())
            .finish_non_exhaustive()
    }
}

impl WaInstance {
    pub fn new(name: impl Into<String>, ctx: Arc<InstanceContext>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            ctx,
            start_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            client: RwLock::new(None),
            state: RwLock::new(InstanceState::default()),
            qr_ready: Notify::new(),
            reconnect_attempt: AtomicU32::new(0),
            removed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> InstanceState {
        self.state.read().await.clone()
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        self.state.read().await.connection
    }

    pub async fn wuid(&self) -> Option<String> {
        self.state.read().await.wuid.clone()
    }

    pub async fn qrcode(&self) -> QrPairing {
        self.state.read().await.qrcode.clone()
    }

    /// Wait up to `timeout` for a pairing challenge to be rendered.
    pub async fn wait_for_qrcode(&self, timeout: Duration) -> QrPairing {
        let notified = self.qr_ready.notified();
        {
            let state = self.state.read().await;
            if state.qrcode.code.is_some() {
                return state.qrcode.clone();
            }
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.qrcode().await
    }

    pub async fn info(&self) -> InstanceInfo {
        let state = self.state.read().await;
        InstanceInfo {
            instance_name: self.name.clone(),
            owner: state.wuid.clone(),
            profile_name: state.profile_name.clone(),
            profile_picture_url: state.profile_picture_url.clone(),
            status: state.connection.state,
        }
    }

    pub async fn webhook(&self) -> LocalWebhook {
        self.state.read().await.webhook.clone()
    }

    /// Replace the per-instance sink and persist it.
    pub async fn set_webhook(&self, webhook: LocalWebhook) -> Result<(), WaError> {
        self.ctx
            .sessions
            .save_webhook(&self.name, &webhook)
            .await
            .map_err(WaError::Session)?;
        self.state.write().await.webhook = webhook;
        Ok(())
    }

    /// Owner of every record this instance produces.
    pub(super) async fn owner(&self) -> String {
        self.wuid().await.unwrap_or_else(|| self.name.clone())
    }

    /// Live connection, only while the session is open.
    pub async fn connection(&self) -> Result<Arc<dyn Connection>, WaError> {
        if self.connection_status().await.state != ConnectionState::Open {
            return Err(WaError::NotConnected(self.name.clone()));
        }
        self.client
            .read()
            .await
            .as_ref()
            .map(|active| active.connection.clone())
            .ok_or_else(|| WaError::NotConnected(self.name.clone()))
    }

    /// Deliver `data` under `event` to this instance's sinks.
    pub(super) async fn send_webhook<T: Serialize>(&self, event: WebhookEvent, data: T) {
        let (owner, local) = {
            let state = self.state.read().await;
            (state.wuid.clone(), state.webhook.clone())
        };
        let source = EventSource {
            instance: &self.name,
            owner: owner.as_deref(),
            local: Some(&local),
        };
        self.ctx.webhooks.dispatch(source, event, data).await;
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Open a session unless one is already live or being established.
    pub async fn start(self: &Arc<Self>) -> Result<(), WaError> {
        let Ok(_guard) = self.start_lock.try_lock() else {
            debug!(instance = %self.name, "Connect already in progress");
            return Ok(());
        };
        if self.is_removed() {
            return Err(WaError::InstanceNotFound(self.name.clone()));
        }
        if self.client.read().await.is_some() {
            debug!(instance = %self.name, "Session already live");
            return Ok(());
        }

        match self.ctx.sessions.load_webhook(&self.name).await {
            Ok(Some(webhook)) => self.state.write().await.webhook = webhook,
            Ok(None) => {}
            Err(e) => warn!(instance = %self.name, error = %e, "Failed to load webhook"),
        }

        let credentials = self
            .ctx
            .sessions
            .load_credentials(&self.name)
            .await
            .map_err(WaError::Session)?;
        if let Some(creds) = &credentials {
            self.apply_credentials(creds).await;
        }

        let options = ConnectOptions {
            instance: self.name.clone(),
            credentials,
            browser: self.ctx.browser.clone(),
            version: self.ctx.connector.latest_version().await,
            connect_timeout: self.ctx.session.connect_timeout,
        };

        let timeout = options.connect_timeout;
        let session = tokio::time::timeout(timeout, self.ctx.connector.connect(options))
            .await
            .map_err(|_| ConnectionError::Timeout)??;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.client.write().await = Some(ActiveConnection {
            generation,
            connection: session.connection,
        });

        info!(instance = %self.name, generation, "Connection opened");
        tokio::spawn(self.clone().run_events(generation, session.events));
        Ok(())
    }

    /// Start, falling back to the backoff reconnect when the attempt fails.
    pub(super) async fn start_or_retry(self: &Arc<Self>) -> Result<(), WaError> {
        let result = self.start().await;
        if let Err(e) = &result {
            if !self.is_removed() {
                warn!(instance = %self.name, error = %e, "Connect failed");
                self.schedule_reconnect(STATUS_CONNECTION_CLOSED);
            }
        }
        result
    }

    /// Cache what the stored credentials reveal about the account.
    async fn apply_credentials(&self, creds: &Value) {
        let me = &creds["me"];
        let mut state = self.state.write().await;
        if let Some(id) = me["id"].as_str() {
            state.wuid = Some(strip_device(id));
        }
        if state.profile_name.is_none() {
            state.profile_name = me["name"]
                .as_str()
                .or_else(|| me["verifiedName"].as_str())
                .map(str::to_string);
        }
    }

    async fn run_events(
        self: Arc<Self>,
        generation: u64,
        mut events: mpsc::Receiver<ConnectionEvent>,
    ) {
        let mut attached = false;

        while let Some(event) = events.recv().await {
            if self.is_removed() || self.generation.load(Ordering::SeqCst) != generation {
                debug!(instance = %self.name, generation, "Dropping events of a replaced connection");
                return;
            }

            match event {
                ConnectionEvent::ConnectionUpdate(update) => {
                    if self
                        .on_connection_update(generation, update, &mut attached)
                        .await
                        .is_break()
                    {
                        return;
                    }
                }
                ConnectionEvent::CredsUpdate(creds) => self.save_credentials(creds).await,
                event if attached => self.handle_event(event).await,
                event => {
                    debug!(instance = %self.name, event = event.name(), "Event before open ignored");
                }
            }
        }

        // Stream ended without a close: treat as a dropped transport.
        if !self.is_removed() && self.generation.load(Ordering::SeqCst) == generation {
            warn!(instance = %self.name, generation, "Event stream ended unexpectedly");
            let update = ConnectionUpdate {
                connection: Some(ConnectionState::Close),
                qr: None,
                status_code: Some(STATUS_CONNECTION_CLOSED),
            };
            let _ = self
                .on_connection_update(generation, update, &mut attached)
                .await;
        }
    }

    async fn save_credentials(&self, creds: Value) {
        self.apply_credentials(&creds).await;
        if let Err(e) = self.ctx.sessions.save_credentials(&self.name, &creds).await {
            error!(instance = %self.name, error = %e, "Failed to persist credentials");
        }
    }

    // ========================================================================
    // State machine
    // ========================================================================

    async fn on_connection_update(
        self: &Arc<Self>,
        generation: u64,
        update: ConnectionUpdate,
        attached: &mut bool,
    ) -> ControlFlow<()> {
        if let Some(code) = update.qr {
            if self.on_qrcode(code).await.is_break() {
                return ControlFlow::Break(());
            }
        }

        let Some(state) = update.connection else {
            return ControlFlow::Continue(());
        };

        let status = ConnectionStatus {
            state,
            status_reason: update.status_code.unwrap_or(STATUS_OK),
        };
        self.state.write().await.connection = status;
        self.send_webhook(
            WebhookEvent::ConnectionUpdate,
            json!({
                "instance": self.name,
                "state": status.state,
                "statusReason": status.status_reason,
            }),
        )
        .await;

        match state {
            ConnectionState::Close => {
                self.on_close(generation, status.status_reason).await;
                ControlFlow::Break(())
            }
            ConnectionState::Open => {
                self.on_open(attached).await;
                ControlFlow::Continue(())
            }
            ConnectionState::Connecting => ControlFlow::Continue(()),
        }
    }

    async fn on_qrcode(&self, code: String) -> ControlFlow<()> {
        let limit = self.ctx.session.qrcode_limit;
        if self.state.read().await.qrcode.count >= limit {
            warn!(instance = %self.name, limit, "QR code limit reached, removing instance");
            self.send_webhook(
                WebhookEvent::ConnectionUpdate,
                json!({
                    "instance": self.name,
                    "state": "refused",
                    "statusReason": STATUS_CONNECTION_CLOSED,
                }),
            )
            .await;
            self.terminate(RemovalReason::QrLimitReached).await;
            return ControlFlow::Break(());
        }

        let count = {
            let mut state = self.state.write().await;
            state.qrcode.count += 1;
            state.qrcode.count
        };

        match qrcode::render_data_url(&code) {
            Ok(base64) => {
                {
                    let mut state = self.state.write().await;
                    state.qrcode.code = Some(code.clone());
                    state.qrcode.base64 = Some(base64.clone());
                }
                self.qr_ready.notify_waiters();
                self.send_webhook(
                    WebhookEvent::QrcodeUpdated,
                    json!({
                        "qrcode": { "instance": self.name, "code": code, "base64": base64 }
                    }),
                )
                .await;
            }
            Err(e) => error!(instance = %self.name, error = %e, "QR code rendering failed"),
        }

        match qrcode::render_terminal(&code) {
            Ok(rendered) => info!(instance = %self.name, qrcode_count = count, "\n{rendered}"),
            Err(e) => debug!(instance = %self.name, error = %e, "Terminal QR rendering failed"),
        }
        ControlFlow::Continue(())
    }

    async fn on_open(&self, attached: &mut bool) {
        let Some(connection) = self.current_connection().await else {
            return;
        };
        let user = connection.user();
        let wuid = user.as_ref().map(|u| strip_device(&u.id));

        {
            let mut state = self.state.write().await;
            if wuid.is_some() {
                state.wuid.clone_from(&wuid);
            }
            if let Some(name) = user.as_ref().and_then(|u| u.name.clone()) {
                state.profile_name = Some(name);
            }
            state.qrcode = QrPairing::default();
        }
        self.reconnect_attempt.store(0, Ordering::SeqCst);

        if !*attached {
            *attached = true;
            debug!(instance = %self.name, "Event handlers attached");
        }

        if let Some(wuid) = &wuid {
            let picture = self.profile_picture(wuid).await;
            self.state.write().await.profile_picture_url = picture.profile_picture_url;
        }

        info!(instance = %self.name, wuid = ?wuid, "Connected to WhatsApp");
    }

    async fn on_close(self: &Arc<Self>, generation: u64, reason: u16) {
        if let Some(connection) = self.take_connection(generation).await {
            connection.end().await;
        }

        if reason == STATUS_LOGGED_OUT {
            info!(instance = %self.name, "Logged out, removing instance");
            self.terminate(RemovalReason::LoggedOut).await;
        } else {
            self.schedule_reconnect(reason);
        }
    }

    /// Emit the removal notice, stop the session and ask the registry to drop us.
    async fn terminate(&self, reason: RemovalReason) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send_webhook(
            WebhookEvent::StatusInstance,
            json!({ "instance": self.name, "status": "removed" }),
        )
        .await;

        if let Some(active) = self.client.write().await.take() {
            active.connection.end().await;
        }

        let signal = RemovalSignal {
            instance: self.name.clone(),
            reason,
        };
        if self.ctx.removals.send(signal).is_err() {
            warn!(instance = %self.name, "Removal channel closed");
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, reason: u16) {
        let attempt = self.reconnect_attempt.fetch_add(1, Ordering::SeqCst);
        let delay = self.ctx.reconnect.backoff(attempt);
        info!(
            instance = %self.name,
            reason,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Connection closed, reconnecting"
        );

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !this.is_removed() {
                let _ = this.start_or_retry().await;
            }
        });
    }

    async fn current_connection(&self) -> Option<Arc<dyn Connection>> {
        self.client
            .read()
            .await
            .as_ref()
            .map(|active| active.connection.clone())
    }

    async fn take_connection(&self, generation: u64) -> Option<Arc<dyn Connection>> {
        let mut client = self.client.write().await;
        if client.as_ref().is_some_and(|active| active.generation == generation) {
            client.take().map(|active| active.connection)
        } else {
            None
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Log the account out. The resulting close removes the instance.
    pub async fn logout(&self) -> Result<(), WaError> {
        let connection = self.connection().await?;
        connection
            .logout()
            .await
            .map_err(|e| WaError::protocol("Logout failed", e))
    }

    /// Delete on request: log out when open, announce the removal, stop.
    ///
    /// A no-op when a terminal close already removed the instance.
    pub async fn remove(&self) {
        let live = self.connection().await.ok();
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(connection) = live {
            if let Err(e) = connection.logout().await {
                warn!(instance = %self.name, error = %e, "Logout before delete failed");
            }
        }
        self.send_webhook(
            WebhookEvent::StatusInstance,
            json!({ "instance": self.name, "status": "removed" }),
        )
        .await;
        self.shutdown().await;
    }

    /// Stop supervising: no further reconnects, the live session is closed.
    pub async fn shutdown(&self) {
        self.removed.store(true, Ordering::SeqCst);
        if let Some(active) = self.client.write().await.take() {
            active.connection.end().await;
        }
        self.state.write().await.connection = ConnectionStatus::default();
    }

    // ========================================================================
    // Lookups shared by the normalizer and the facade
    // ========================================================================

    /// Best-effort profile picture; `None` on any failure.
    pub async fn profile_picture(&self, number: &str) -> ProfilePicture {
        let jid = create_jid(number);
        let url = match self.current_connection().await {
            Some(connection) => match connection.profile_picture_url(&jid).await {
                Ok(url) => url,
                Err(e) => {
                    debug!(instance = %self.name, jid = %jid, error = %e, "No profile picture");
                    None
                }
            },
            None => None,
        };
        ProfilePicture {
            wuid: jid,
            profile_picture_url: url,
        }
    }
}
