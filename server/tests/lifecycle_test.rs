//! Connection lifecycle against a scripted transport.
//!
//! Run with: `cargo test --test lifecycle_test`

mod helpers;

use helpers::{spawn_capture_server, wait_until, Captured, TestApp, TestServer, WUID};
use std::time::Duration;

use serde_json::json;
use wr_common::{ConnectionState, STATUS_CONNECTION_CLOSED, STATUS_LOGGED_OUT};
use wr_server::webhooks::{EnabledEvents, GlobalWebhook};
use wr_server::whatsapp::{ConnectResponse, ConnectionEvent, UpsertType, WaError};

async fn app_with_global_sink() -> (TestApp, TestServer, Captured) {
    let (server, captured) = spawn_capture_server().await;
    let app = TestApp::with_webhooks(
        GlobalWebhook {
            enabled: true,
            url: Some(format!("{}/global", server.url)),
        },
        EnabledEvents::all(),
    )
    .await;
    (app, server, captured)
}

#[tokio::test]
async fn create_announces_instance_without_connecting() {
    let (app, _server, captured) = app_with_global_sink().await;

    app.monitor.create_instance("sales", None).await.unwrap();

    let created = captured.wait_for("status.instance", 1).await;
    assert_eq!(
        created[0].body["data"],
        json!({ "instance": "sales", "status": "created" })
    );
    assert_eq!(app.connector.connects(), 0);
    assert_eq!(
        app.monitor.connection_state("sales").await.unwrap().state,
        ConnectionState::Close
    );
}

#[tokio::test]
async fn blank_name_gets_generated() {
    let app = TestApp::new().await;

    let instance = app.monitor.create_instance("  ", None).await.unwrap();

    assert!(uuid::Uuid::parse_str(instance.name()).is_ok());
    assert!(app.monitor.get(instance.name()).is_ok());
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let app = TestApp::new().await;
    app.monitor.create_instance("sales", None).await.unwrap();

    let err = app.monitor.create_instance("sales", None).await.unwrap_err();

    assert!(matches!(err, WaError::AlreadyExists(name) if name == "sales"));
    assert_eq!(app.monitor.len(), 1);
}

#[tokio::test]
async fn connect_returns_first_qr_code() {
    let (app, _server, captured) = app_with_global_sink().await;
    app.monitor.create_instance("sales", None).await.unwrap();

    let connector = app.connector.clone();
    tokio::spawn(async move {
        connector.session(0).await.emit_qr("2@first-code").await;
    });
    let response = app.monitor.connect("sales").await.unwrap();

    let ConnectResponse::Qrcode(qr) = response else {
        panic!("expected a pairing challenge");
    };
    assert_eq!(qr.count, 1);
    assert_eq!(qr.code.as_deref(), Some("2@first-code"));

    let updates = captured.wait_for("qrcode.updated", 1).await;
    let qrcode = &updates[0].body["data"]["qrcode"];
    assert_eq!(qrcode["instance"], "sales");
    assert_eq!(qrcode["code"], "2@first-code");
    assert!(qrcode["base64"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn qr_limit_refuses_and_removes_instance() {
    let (app, _server, captured) = app_with_global_sink().await;
    let limit = app.config.session.qrcode_limit as usize;
    let instance = app.monitor.create_instance("sales", None).await.unwrap();
    instance.start().await.unwrap();
    let session = app.connector.session(0).await;

    for n in 0..limit {
        session.emit_qr(&format!("2@code-{n}")).await;
    }
    captured.wait_for("qrcode.updated", limit).await;
    assert_eq!(instance.qrcode().await.count as usize, limit);

    session.emit_qr("2@one-too-many").await;

    wait_until(|| app.monitor.get("sales").is_err()).await;
    let refused = captured
        .wait_for("connection.update", 1)
        .await
        .into_iter()
        .find(|d| d.body["data"]["state"] == "refused")
        .expect("refused notice");
    assert_eq!(
        refused.body["data"]["statusReason"],
        json!(STATUS_CONNECTION_CLOSED)
    );

    let status = captured.wait_for("status.instance", 2).await;
    assert_eq!(status[1].body["data"]["status"], "removed");
    assert_eq!(captured.of("qrcode.updated").len(), limit);
    assert!(session.connection.methods().contains(&"end".to_string()));
}

#[tokio::test]
async fn concurrent_starts_collapse_into_one_connect() {
    let app = TestApp::new().await;
    let instance = app.monitor.create_instance("sales", None).await.unwrap();

    let (first, second) = tokio::join!(instance.start(), instance.start());

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(app.connector.attempts(), 1);

    // A live session also short-circuits later starts.
    instance.start().await.unwrap();
    assert_eq!(app.connector.connects(), 1);
}

#[tokio::test]
async fn failed_connect_request_retries_in_background() {
    let app = TestApp::new().await;
    app.monitor.create_instance("sales", None).await.unwrap();
    app.connector.fail_next(1);

    let err = app.monitor.connect("sales").await.unwrap_err();
    assert!(matches!(err, WaError::Protocol { .. }));

    let retried = app.connector.session(0).await;
    assert_eq!(retried.options.instance, "sales");
    assert_eq!(app.connector.attempts(), 2);
}

#[tokio::test]
async fn open_resolves_account_and_resets_qr_count() {
    let app = TestApp::new().await;
    let instance = app.monitor.create_instance("sales", None).await.unwrap();
    instance.start().await.unwrap();
    let session = app.connector.session(0).await;
    session.emit_qr("2@code").await;
    wait_until_qr(&instance, 1).await;

    session.emit_state(ConnectionState::Open, None).await;
    helpers::wait_until_async(|| {
        let instance = instance.clone();
        async move { instance.connection_status().await.state == ConnectionState::Open }
    })
    .await;

    let state = instance.state().await;
    assert_eq!(state.wuid.as_deref(), Some(WUID));
    assert_eq!(state.profile_name.as_deref(), Some("Relay Account"));
    assert_eq!(state.qrcode.count, 0);
    assert_eq!(
        state.profile_picture_url.as_deref(),
        Some(format!("https://pps.whatsapp.net/v/{WUID}.jpg").as_str())
    );

    let response = app.monitor.connect("sales").await.unwrap();
    assert!(matches!(
        response,
        ConnectResponse::State(s) if s.state == ConnectionState::Open
    ));
}

async fn wait_until_qr(instance: &std::sync::Arc<wr_server::whatsapp::WaInstance>, count: u32) {
    helpers::wait_until_async(|| {
        let instance = instance.clone();
        async move { instance.qrcode().await.count >= count }
    })
    .await;
}

#[tokio::test]
async fn logged_out_close_removes_instance() {
    let (app, _server, captured) = app_with_global_sink().await;
    let (_instance, session) = app.open_instance("sales").await;

    session
        .emit_state(ConnectionState::Close, Some(STATUS_LOGGED_OUT))
        .await;

    wait_until(|| app.monitor.get("sales").is_err()).await;
    let status = captured.wait_for("status.instance", 2).await;
    assert_eq!(status[1].body["data"]["status"], "removed");
    assert_eq!(app.connector.connects(), 1);
}

#[tokio::test]
async fn other_close_reconnects() {
    let app = TestApp::new().await;
    let (instance, session) = app.open_instance("sales").await;

    session
        .emit_state(ConnectionState::Close, Some(STATUS_CONNECTION_CLOSED))
        .await;

    let second = app.connector.session(1).await;
    assert!(second.options.credentials.is_none());
    assert!(app.monitor.get("sales").is_ok());
    assert!(session.connection.methods().contains(&"end".to_string()));

    // Well past the backoff cap: still exactly one reconnect for one close.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.connector.attempts(), 2);
    assert_eq!(app.connector.connects(), 2);

    second.emit_state(ConnectionState::Open, None).await;
    helpers::wait_until_async(|| {
        let instance = instance.clone();
        async move { instance.connection_status().await.state == ConnectionState::Open }
    })
    .await;
}

#[tokio::test]
async fn reconnect_uses_persisted_credentials() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("sales").await;
    let creds = json!({ "me": { "id": "5511999999999:12@s.whatsapp.net", "name": "Relay" } });

    session
        .emit(ConnectionEvent::CredsUpdate(creds.clone()))
        .await;
    session
        .emit_state(ConnectionState::Close, Some(STATUS_CONNECTION_CLOSED))
        .await;

    let second = app.connector.session(1).await;
    assert_eq!(second.options.credentials, Some(creds));
    assert_eq!(second.options.instance, "sales");
}

#[tokio::test]
async fn events_before_open_are_ignored() {
    let app = TestApp::new().await;
    let instance = app.monitor.create_instance("sales", None).await.unwrap();
    instance.start().await.unwrap();
    let session = app.connector.session(0).await;

    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![helpers::inbound_text("EARLY", "5511888888888@s.whatsapp.net", "hi")],
            kind: UpsertType::Notify,
        })
        .await;
    session.emit_state(ConnectionState::Open, None).await;
    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![helpers::inbound_text("LATE", "5511888888888@s.whatsapp.net", "hi")],
            kind: UpsertType::Notify,
        })
        .await;

    wait_until(|| !app.records.messages().is_empty()).await;
    let ids: Vec<String> = app
        .records
        .messages()
        .into_iter()
        .map(|m| m.key.id)
        .collect();
    assert_eq!(ids, vec!["LATE".to_string()]);
}

#[tokio::test]
async fn logout_then_close_removes_instance() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("sales").await;

    app.monitor.logout_instance("sales").await.unwrap();
    assert!(session.connection.methods().contains(&"logout".to_string()));

    session
        .emit_state(ConnectionState::Close, Some(STATUS_LOGGED_OUT))
        .await;
    wait_until(|| app.monitor.get("sales").is_err()).await;
}

#[tokio::test]
async fn logout_requires_open_session() {
    let app = TestApp::new().await;
    app.monitor.create_instance("sales", None).await.unwrap();

    let err = app.monitor.logout_instance("sales").await.unwrap_err();

    assert!(matches!(err, WaError::NotConnected(_)));
}

#[tokio::test]
async fn delete_logs_out_and_forgets() {
    let (app, _server, captured) = app_with_global_sink().await;
    let (_instance, session) = app.open_instance("sales").await;

    app.monitor.delete_instance("sales").await.unwrap();

    assert!(app.monitor.get("sales").is_err());
    let methods = session.connection.methods();
    assert!(methods.contains(&"logout".to_string()));
    assert!(methods.contains(&"end".to_string()));
    let status = captured.wait_for("status.instance", 2).await;
    assert_eq!(status[1].body["data"]["status"], "removed");

    // The name is free again.
    app.monitor.create_instance("sales", None).await.unwrap();
}

#[tokio::test]
async fn delete_unknown_instance_fails() {
    let app = TestApp::new().await;

    let err = app.monitor.delete_instance("ghost").await.unwrap_err();

    assert!(matches!(err, WaError::InstanceNotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn load_instances_restores_persisted_sessions() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("sales").await;
    session
        .emit(ConnectionEvent::CredsUpdate(json!({ "me": { "id": WUID } })))
        .await;
    wait_until(|| app.config.instance_dir.join("sales").exists()).await;

    // A second registry over the same directories picks the session up.
    let restored = TestApp::reopen(&app).await;
    let loaded = restored.monitor.load_instances().await.unwrap();

    assert_eq!(loaded, 1);
    let resumed = restored.connector.session(0).await;
    assert_eq!(resumed.options.instance, "sales");
    assert!(resumed.options.credentials.is_some());
}

#[tokio::test]
async fn failed_restore_retries_with_backoff() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("sales").await;
    session
        .emit(ConnectionEvent::CredsUpdate(json!({ "me": { "id": WUID } })))
        .await;
    wait_until(|| app.config.instance_dir.join("sales").exists()).await;

    let restored = TestApp::reopen(&app).await;
    restored.connector.fail_next(2);
    let loaded = restored.monitor.load_instances().await.unwrap();
    assert_eq!(loaded, 1);

    let resumed = restored.connector.session(0).await;
    assert_eq!(restored.connector.attempts(), 3);
    assert!(resumed.options.credentials.is_some());
    assert!(restored.monitor.get("sales").is_ok());
}
