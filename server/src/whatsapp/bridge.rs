//! Transport Bridge
//!
//! [`Connector`] backed by an external protocol sidecar reached over a
//! WebSocket at `<bridge_url>/session/<instance>`. Commands are JSON request
//! frames answered by response frames with the same id; events arrive as
//! event frames in emission order.
//!
//! The socket task never waits on the instance: events go through an
//! unbounded hop to a forwarding task, so responses keep flowing while the
//! instance is busy with a backlog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wr_common::{
    ConnectedUser, ConnectionState, ConnectionUpdate, MessageKey, Presence, WaMessage,
    STATUS_CONNECTION_CLOSED,
};

use super::connection::{
    ConnectOptions, Connection, ConnectionEvent, Connector, MediaInput, MediaKind, OnWhatsApp,
    ParticipantAction, Session,
};
use super::error::ConnectionError;

/// Events buffered between the forwarding task and the instance.
const EVENT_BUFFER: usize = 256;

/// Default wait for the response to a single request.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OutboundFrame<'a> {
    Request {
        id: u64,
        method: &'a str,
        params: Value,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InboundFrame {
    Event(ConnectionEvent),
    Response {
        id: u64,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
}

type Pending = DashMap<u64, oneshot::Sender<Result<Value, ConnectionError>>>;

/// Opens sessions through the protocol sidecar.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    base_url: String,
    http: reqwest::Client,
    call_timeout: Duration,
}

impl BridgeConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            call_timeout: CALL_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn session_url(&self, instance: &str) -> String {
        format!("{}/session/{instance}", self.base_url)
    }

    /// HTTP base of the sidecar, derived from its WebSocket URL.
    fn http_base(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            self.base_url.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: Vec<u32>,
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn latest_version(&self) -> Option<Vec<u32>> {
        let url = format!("{}/version", self.http_base());
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Protocol version lookup failed");
                return None;
            }
        };
        match response.json::<VersionResponse>().await {
            Ok(body) => Some(body.version),
            Err(e) => {
                debug!(error = %e, "Unreadable protocol version");
                None
            }
        }
    }

    async fn connect(&self, options: ConnectOptions) -> Result<Session, ConnectionError> {
        let url = self.session_url(&options.instance);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        info!(instance = %options.instance, url = %url, "Bridge socket connected");

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(BridgeConnection {
            instance: options.instance.clone(),
            outbound: outbound_tx,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            user: Arc::new(RwLock::new(None)),
            shutdown: CancellationToken::new(),
            call_timeout: self.call_timeout,
        });

        tokio::spawn(run_socket(
            socket,
            connection.clone(),
            outbound_rx,
            incoming_tx,
        ));
        tokio::spawn(forward_events(incoming_rx, events_tx));

        // Closes the socket if the handshake fails or this future is dropped.
        let handshake = connection.shutdown.clone().drop_guard();
        let params = json!({
            "credentials": options.credentials,
            "browser": options.browser,
            "version": options.version,
        });
        let result = connection.call("connect", params).await?;
        if let Ok(user) = serde_json::from_value::<ConnectedUser>(result["user"].clone()) {
            connection.set_user(user);
        }
        handshake.disarm();

        Ok(Session {
            connection,
            events: events_rx,
        })
    }
}

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Move events into the bounded instance channel, in order.
async fn forward_events(
    mut incoming: mpsc::UnboundedReceiver<ConnectionEvent>,
    events: mpsc::Sender<ConnectionEvent>,
) {
    while let Some(event) = incoming.recv().await {
        if events.send(event).await.is_err() {
            return;
        }
    }
}

/// Pump frames both ways until either side closes.
async fn run_socket(
    socket: Socket,
    connection: Arc<BridgeConnection>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let (mut write, mut read) = socket.split();
    let instance = connection.instance.clone();

    loop {
        tokio::select! {
            () = connection.shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                debug!(instance = %instance, "Bridge socket closed locally");
                connection.pending.clear();
                return;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write.send(frame).await {
                    warn!(instance = %instance, error = %e, "Failed to write bridge frame");
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !connection.handle_frame(text.as_str(), &events) {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(instance = %instance, error = %e, "Failed to send pong");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(instance = %instance, "Bridge closed the session");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(instance = %instance, error = %e, "Bridge socket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Fail every in-flight call, then report the loss as a retryable close.
    connection.pending.clear();
    let close = ConnectionEvent::ConnectionUpdate(ConnectionUpdate {
        connection: Some(ConnectionState::Close),
        qr: None,
        status_code: Some(STATUS_CONNECTION_CLOSED),
    });
    let _ = events.send(close);
}

struct BridgeConnection {
    instance: String,
    outbound: mpsc::UnboundedSender<Message>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    user: Arc<RwLock<Option<ConnectedUser>>>,
    shutdown: CancellationToken,
    call_timeout: Duration,
}

impl BridgeConnection {
    fn set_user(&self, user: ConnectedUser) {
        if let Ok(mut slot) = self.user.write() {
            *slot = Some(user);
        }
    }

    /// Route one inbound frame. `false` once the event receiver is gone.
    fn handle_frame(&self, text: &str, events: &mpsc::UnboundedSender<ConnectionEvent>) -> bool {
        let frame = match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(instance = %self.instance, error = %e, "Ignoring unknown bridge frame");
                return true;
            }
        };

        match frame {
            InboundFrame::Response { id, result, error } => {
                if let Some((_, reply)) = self.pending.remove(&id) {
                    let outcome = match error {
                        Some(message) => Err(ConnectionError::Remote(message)),
                        None => Ok(result),
                    };
                    let _ = reply.send(outcome);
                }
                true
            }
            InboundFrame::Event(event) => {
                if let ConnectionEvent::CredsUpdate(creds) = &event {
                    if let Ok(user) = serde_json::from_value::<ConnectedUser>(creds["me"].clone()) {
                        self.set_user(user);
                    }
                }
                events.send(event).is_ok()
            }
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ConnectionError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&OutboundFrame::Request { id, method, params })
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let (reply, response) = oneshot::channel();
        self.pending.insert(id, reply);
        if self.outbound.send(Message::text(frame)).is_err() {
            self.pending.remove(&id);
            return Err(ConnectionError::Closed);
        }

        match tokio::time::timeout(self.call_timeout, response).await {
            Ok(outcome) => outcome.map_err(|_| ConnectionError::Closed)?,
            Err(_) => {
                self.pending.remove(&id);
                warn!(instance = %self.instance, method, "Bridge request timed out");
                Err(ConnectionError::Timeout)
            }
        }
    }

    async fn call_as<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ConnectionError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| ConnectionError::Transport(format!("bad {method} result: {e}")))
    }
}

#[async_trait]
impl Connection for BridgeConnection {
    fn user(&self) -> Option<ConnectedUser> {
        self.user.read().ok().and_then(|user| user.clone())
    }

    async fn send_message(&self, jid: &str, content: Value) -> Result<WaMessage, ConnectionError> {
        self.call_as("sendMessage", json!({ "jid": jid, "content": content }))
            .await
    }

    async fn presence_subscribe(&self, jid: &str) -> Result<(), ConnectionError> {
        self.call("presenceSubscribe", json!({ "jid": jid }))
            .await
            .map(drop)
    }

    async fn send_presence_update(
        &self,
        presence: Presence,
        jid: &str,
    ) -> Result<(), ConnectionError> {
        self.call(
            "sendPresenceUpdate",
            json!({ "presence": presence, "jid": jid }),
        )
        .await
        .map(drop)
    }

    async fn profile_picture_url(&self, jid: &str) -> Result<Option<String>, ConnectionError> {
        self.call_as("profilePictureUrl", json!({ "jid": jid }))
            .await
    }

    async fn on_whatsapp(&self, jid: &str) -> Result<Vec<OnWhatsApp>, ConnectionError> {
        self.call_as("onWhatsApp", json!({ "jid": jid })).await
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), ConnectionError> {
        self.call("readMessages", json!({ "keys": keys }))
            .await
            .map(drop)
    }

    async fn chat_modify(&self, jid: &str, modification: Value) -> Result<(), ConnectionError> {
        self.call(
            "chatModify",
            json!({ "jid": jid, "modification": modification }),
        )
        .await
        .map(drop)
    }

    async fn prepare_media(
        &self,
        kind: MediaKind,
        media: MediaInput,
    ) -> Result<Value, ConnectionError> {
        let source = match media {
            MediaInput::Url(url) => json!({ "url": url }),
            MediaInput::Bytes(bytes) => json!({ "base64": STANDARD.encode(bytes) }),
        };
        self.call(
            "prepareMedia",
            json!({ "mediatype": kind, "media": source }),
        )
        .await
    }

    async fn download_media(&self, message: &WaMessage) -> Result<Vec<u8>, ConnectionError> {
        #[derive(Deserialize)]
        struct Download {
            base64: String,
        }
        let download: Download = self
            .call_as("downloadMedia", json!({ "message": message }))
            .await?;
        STANDARD
            .decode(download.base64)
            .map_err(|e| ConnectionError::Transport(format!("bad media body: {e}")))
    }

    async fn group_create(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<Value, ConnectionError> {
        self.call(
            "groupCreate",
            json!({ "subject": subject, "participants": participants }),
        )
        .await
    }

    async fn group_update_subject(&self, jid: &str, subject: &str) -> Result<(), ConnectionError> {
        self.call(
            "groupUpdateSubject",
            json!({ "jid": jid, "subject": subject }),
        )
        .await
        .map(drop)
    }

    async fn group_update_description(
        &self,
        jid: &str,
        description: &str,
    ) -> Result<(), ConnectionError> {
        self.call(
            "groupUpdateDescription",
            json!({ "jid": jid, "description": description }),
        )
        .await
        .map(drop)
    }

    async fn group_metadata(&self, jid: &str) -> Result<Value, ConnectionError> {
        self.call("groupMetadata", json!({ "jid": jid })).await
    }

    async fn group_invite_code(&self, jid: &str) -> Result<String, ConnectionError> {
        self.call_as("groupInviteCode", json!({ "jid": jid }))
            .await
    }

    async fn group_revoke_invite(&self, jid: &str) -> Result<String, ConnectionError> {
        self.call_as("groupRevokeInvite", json!({ "jid": jid }))
            .await
    }

    async fn group_participants_update(
        &self,
        jid: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<Value, ConnectionError> {
        self.call(
            "groupParticipantsUpdate",
            json!({ "jid": jid, "participants": participants, "action": action }),
        )
        .await
    }

    async fn group_leave(&self, jid: &str) -> Result<(), ConnectionError> {
        self.call("groupLeave", json!({ "jid": jid }))
            .await
            .map(drop)
    }

    async fn update_profile_picture(
        &self,
        jid: &str,
        image: Vec<u8>,
    ) -> Result<(), ConnectionError> {
        self.call(
            "updateProfilePicture",
            json!({ "jid": jid, "image": STANDARD.encode(image) }),
        )
        .await
        .map(drop)
    }

    async fn logout(&self) -> Result<(), ConnectionError> {
        self.call("logout", Value::Null).await.map(drop)
    }

    async fn end(&self) {
        self.shutdown.cancel();
    }
}
