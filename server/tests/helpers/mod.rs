//! Reusable test helpers for integration tests.
//!
//! Provides a scripted [`MockConnector`] standing in for the protocol
//! transport, a capture server standing in for webhook sinks, and
//! [`TestApp`] wiring both into a registry and the full axum router.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{self, Method, Request, Response, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use wr_common::{
    ConnectedUser, ConnectionState, ConnectionUpdate, MessageKey, MessageTimestamp, Presence,
    WaMessage,
};
use wr_server::api::{create_router, AppState};
use wr_server::config::Config;
use wr_server::store::{FileSessionStore, MemoryRecordStore, Repository};
use wr_server::tasks::BackgroundTasks;
use wr_server::webhooks::{EnabledEvents, GlobalWebhook, WebhookDispatcher};
use wr_server::whatsapp::{
    ConnectOptions, Connection, ConnectionError, ConnectionEvent, Connector, MediaInput,
    MediaKind, MonitorDeps, OnWhatsApp, ParticipantAction, Session, WaInstance, WaMonitor,
};

/// Account every mock session authenticates as.
pub const WUID: &str = "5511999999999@s.whatsapp.net";
pub const RAW_USER_ID: &str = "5511999999999:12@s.whatsapp.net";

// ============================================================================
// Mock transport
// ============================================================================

/// Command surface that records every call and answers with canned data.
#[derive(Debug, Default)]
pub struct MockConnection {
    calls: Mutex<Vec<(String, Value)>>,
    sent: AtomicUsize,
    user: Option<ConnectedUser>,
}

impl MockConnection {
    fn record(&self, method: &str, params: Value) {
        self.calls
            .lock()
            .expect("calls lock")
            .push((method.to_string(), params));
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Names of the calls so far, in order.
    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(m, _)| m).collect()
    }

    /// Parameters of the last call named `method`.
    pub fn last(&self, method: &str) -> Option<Value> {
        self.calls()
            .into_iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, p)| p)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn user(&self) -> Option<ConnectedUser> {
        self.user.clone()
    }

    async fn send_message(&self, jid: &str, content: Value) -> Result<WaMessage, ConnectionError> {
        self.record("send_message", json!({ "jid": jid, "content": content }));
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(WaMessage {
            key: MessageKey {
                id: format!("3EB0{n:012X}"),
                remote_jid: jid.to_string(),
                from_me: true,
                participant: None,
            },
            push_name: None,
            message: content.get("forward").map(|f| f["message"].clone()),
            message_timestamp: Some(MessageTimestamp::Seconds(1_700_000_000)),
        })
    }

    async fn presence_subscribe(&self, jid: &str) -> Result<(), ConnectionError> {
        self.record("presence_subscribe", json!({ "jid": jid }));
        Ok(())
    }

    async fn send_presence_update(
        &self,
        presence: Presence,
        jid: &str,
    ) -> Result<(), ConnectionError> {
        self.record(
            "send_presence_update",
            json!({ "presence": presence, "jid": jid }),
        );
        Ok(())
    }

    async fn profile_picture_url(&self, jid: &str) -> Result<Option<String>, ConnectionError> {
        if jid.starts_with("404") {
            return Err(ConnectionError::Remote("item-not-found".into()));
        }
        Ok(Some(format!("https://pps.whatsapp.net/v/{jid}.jpg")))
    }

    async fn on_whatsapp(&self, jid: &str) -> Result<Vec<OnWhatsApp>, ConnectionError> {
        if jid.starts_with("000") {
            return Err(ConnectionError::Remote("bad-request".into()));
        }
        Ok(vec![OnWhatsApp {
            exists: jid.starts_with("55"),
            jid: jid.to_string(),
        }])
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), ConnectionError> {
        self.record("read_messages", json!({ "keys": keys }));
        Ok(())
    }

    async fn chat_modify(&self, jid: &str, modification: Value) -> Result<(), ConnectionError> {
        self.record(
            "chat_modify",
            json!({ "jid": jid, "modification": modification }),
        );
        Ok(())
    }

    async fn prepare_media(
        &self,
        kind: MediaKind,
        media: MediaInput,
    ) -> Result<Value, ConnectionError> {
        let source = match media {
            MediaInput::Url(url) => url,
            MediaInput::Bytes(bytes) => format!("{} bytes", bytes.len()),
        };
        self.record("prepare_media", json!({ "kind": kind, "source": source }));
        let mut message = serde_json::Map::new();
        message.insert(
            kind.message_key(),
            json!({ "url": "https://mmg.whatsapp.net/d/f/upload.enc", "fileLength": 42 }),
        );
        Ok(Value::Object(message))
    }

    async fn download_media(&self, message: &WaMessage) -> Result<Vec<u8>, ConnectionError> {
        self.record("download_media", json!({ "id": message.key.id }));
        Ok(b"media-bytes".to_vec())
    }

    async fn group_create(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<Value, ConnectionError> {
        self.record(
            "group_create",
            json!({ "subject": subject, "participants": participants }),
        );
        Ok(json!({ "id": "120363000000000000@g.us", "subject": subject }))
    }

    async fn group_update_subject(&self, jid: &str, subject: &str) -> Result<(), ConnectionError> {
        self.record(
            "group_update_subject",
            json!({ "jid": jid, "subject": subject }),
        );
        Ok(())
    }

    async fn group_update_description(
        &self,
        jid: &str,
        description: &str,
    ) -> Result<(), ConnectionError> {
        self.record(
            "group_update_description",
            json!({ "jid": jid, "description": description }),
        );
        Ok(())
    }

    async fn group_metadata(&self, jid: &str) -> Result<Value, ConnectionError> {
        if !jid.ends_with("@g.us") {
            return Err(ConnectionError::Remote("item-not-found".into()));
        }
        Ok(json!({
            "id": jid,
            "subject": "Team",
            "participants": [{ "id": WUID, "admin": "superadmin" }],
        }))
    }

    async fn group_invite_code(&self, _jid: &str) -> Result<String, ConnectionError> {
        Ok("AbC123".into())
    }

    async fn group_revoke_invite(&self, _jid: &str) -> Result<String, ConnectionError> {
        Ok("XyZ789".into())
    }

    async fn group_participants_update(
        &self,
        jid: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<Value, ConnectionError> {
        self.record(
            "group_participants_update",
            json!({ "jid": jid, "participants": participants, "action": action }),
        );
        Ok(json!(participants
            .iter()
            .map(|p| json!({ "status": "200", "jid": p }))
            .collect::<Vec<_>>()))
    }

    async fn group_leave(&self, jid: &str) -> Result<(), ConnectionError> {
        self.record("group_leave", json!({ "jid": jid }));
        Ok(())
    }

    async fn update_profile_picture(
        &self,
        jid: &str,
        image: Vec<u8>,
    ) -> Result<(), ConnectionError> {
        self.record(
            "update_profile_picture",
            json!({ "jid": jid, "bytes": image.len() }),
        );
        Ok(())
    }

    async fn logout(&self) -> Result<(), ConnectionError> {
        self.record("logout", Value::Null);
        Ok(())
    }

    async fn end(&self) {
        self.record("end", Value::Null);
    }
}

/// One session handed out by the mock connector.
#[derive(Clone)]
pub struct MockSession {
    pub options: ConnectOptions,
    pub events: mpsc::Sender<ConnectionEvent>,
    pub connection: Arc<MockConnection>,
}

impl MockSession {
    pub async fn emit(&self, event: ConnectionEvent) {
        self.events.send(event).await.expect("event receiver alive");
    }

    pub async fn emit_state(&self, state: ConnectionState, status_code: Option<u16>) {
        self.emit(ConnectionEvent::ConnectionUpdate(ConnectionUpdate {
            connection: Some(state),
            qr: None,
            status_code,
        }))
        .await;
    }

    pub async fn emit_qr(&self, code: &str) {
        self.emit(ConnectionEvent::ConnectionUpdate(ConnectionUpdate {
            connection: None,
            qr: Some(code.to_string()),
            status_code: None,
        }))
        .await;
    }
}

/// Connector that opens scripted sessions and remembers each one.
#[derive(Default)]
pub struct MockConnector {
    sessions: Mutex<Vec<MockSession>>,
    attempts: AtomicUsize,
    failures: AtomicUsize,
}

impl MockConnector {
    /// Sessions successfully opened.
    pub fn connects(&self) -> usize {
        self.sessions.lock().expect("sessions lock").len()
    }

    /// Connect calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Fail the next `n` connect calls with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// The `n`th session opened (0-based), waiting for it if needed.
    pub async fn session(&self, n: usize) -> MockSession {
        wait_until(|| self.connects() > n).await;
        self.sessions.lock().expect("sessions lock")[n].clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn latest_version(&self) -> Option<Vec<u32>> {
        Some(vec![2, 2413, 1])
    }

    async fn connect(&self, options: ConnectOptions) -> Result<Session, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConnectionError::Transport("bridge down".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        let connection = Arc::new(MockConnection {
            user: Some(ConnectedUser {
                id: RAW_USER_ID.into(),
                name: Some("Relay Account".into()),
            }),
            ..Default::default()
        });
        self.sessions
            .lock()
            .expect("sessions lock")
            .push(MockSession {
                options,
                events: tx,
                connection: connection.clone(),
            });
        Ok(Session {
            connection,
            events: rx,
        })
    }
}

// ============================================================================
// Webhook capture server
// ============================================================================

/// One POST received by the capture server.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub path: String,
    pub owner: Option<String>,
    pub body: Value,
}

impl Delivery {
    pub fn event(&self) -> &str {
        self.body["event"].as_str().unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<Delivery>>>);

impl Captured {
    pub fn all(&self) -> Vec<Delivery> {
        self.0.lock().expect("capture lock").clone()
    }

    pub fn of(&self, event: &str) -> Vec<Delivery> {
        self.all().into_iter().filter(|d| d.event() == event).collect()
    }

    pub async fn wait_for(&self, event: &str, count: usize) -> Vec<Delivery> {
        wait_until(|| self.of(event).len() >= count).await;
        self.of(event)
    }
}

#[derive(Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

async fn capture(
    State(captured): State<Captured>,
    uri: http::Uri,
    Query(query): Query<OwnerQuery>,
    Json(body): Json<Value>,
) -> StatusCode {
    captured.0.lock().expect("capture lock").push(Delivery {
        path: uri.path().to_string(),
        owner: query.owner,
        body,
    });
    StatusCode::OK
}

/// Handle for a spawned test server.
pub struct TestServer {
    pub addr: SocketAddr,
    pub url: String,
    _handle: JoinHandle<()>,
}

/// Spawn a real HTTP server on a random port.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        _handle: handle,
    }
}

/// Spawn a webhook sink accepting POSTs on `/local` and `/global`.
pub async fn spawn_capture_server() -> (TestServer, Captured) {
    let captured = Captured::default();
    let router = Router::new()
        .route("/local", post(capture))
        .route("/global", post(capture))
        .with_state(captured.clone());
    (spawn_test_server(router).await, captured)
}

// ============================================================================
// App wiring
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub monitor: Arc<WaMonitor>,
    pub connector: Arc<MockConnector>,
    pub records: Arc<MemoryRecordStore>,
    pub config: Config,
    _dir: Option<TempDir>,
}

impl TestApp {
    /// App with every event enabled and no global sink.
    pub async fn new() -> Self {
        Self::with_webhooks(GlobalWebhook::default(), EnabledEvents::all()).await
    }

    pub async fn with_webhooks(global: GlobalWebhook, events: EnabledEvents) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut config = Config::default_for_test();
        config.instance_dir = dir.path().join("instances");
        config.store_dir = dir.path().join("store");
        config.webhook.global = global;
        config.webhook.events = events;
        Self::build(config, Some(dir))
    }

    /// Fresh registry and connector over the directories of `other`.
    pub async fn reopen(other: &Self) -> Self {
        Self::build(other.config.clone(), None)
    }

    fn build(config: Config, dir: Option<TempDir>) -> Self {
        let connector = Arc::new(MockConnector::default());
        let records = Arc::new(MemoryRecordStore::new());
        let monitor = WaMonitor::start(
            MonitorDeps {
                connector: connector.clone(),
                sessions: Arc::new(FileSessionStore::new(
                    config.instance_dir.clone(),
                    &config.store_dir,
                )),
                repository: Repository::new(records.clone(), config.database.save),
                webhooks: WebhookDispatcher::from_parts(
                    config.webhook.global.clone(),
                    config.webhook.events.clone(),
                    Duration::from_secs(2),
                ),
                tasks: BackgroundTasks::new(),
            },
            &config,
        );
        let router = create_router(AppState::new(monitor.clone(), config.clone()));

        Self {
            router,
            monitor,
            connector,
            records,
            config,
            _dir: dir,
        }
    }

    /// Create `name`, connect it and drive the mock session to `open`.
    pub async fn open_instance(&self, name: &str) -> (Arc<WaInstance>, MockSession) {
        let instance = self
            .monitor
            .create_instance(name, None)
            .await
            .expect("create instance");
        instance.start().await.expect("start");
        let session = self.connector.session(self.connector.connects() - 1).await;
        session.emit_state(ConnectionState::Open, None).await;
        wait_until_async(|| {
            let instance = instance.clone();
            async move { instance.connection_status().await.state == ConnectionState::Open }
        })
        .await;
        (instance, session)
    }

    /// Create a request builder.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// JSON request with a body.
    pub fn json(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Self::request(method, uri)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(body).expect("json body")))
            .expect("request")
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Poll `condition` every 10ms; panic after 3s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 3s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Async flavour of [`wait_until`].
pub async fn wait_until_async<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 3s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Read the response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

/// Inbound text message as the transport delivers it.
pub fn inbound_text(id: &str, from: &str, text: &str) -> WaMessage {
    WaMessage {
        key: MessageKey {
            id: id.to_string(),
            remote_jid: from.to_string(),
            from_me: false,
            participant: None,
        },
        push_name: Some("Ana".into()),
        message: Some(json!({ "conversation": text })),
        message_timestamp: Some(MessageTimestamp::Long {
            low: 1_700_000_000,
            high: 0,
            unsigned: true,
        }),
    }
}
