//! Event normalization: records persisted and webhooks emitted per category.
//!
//! Run with: `cargo test --test normalizer_test`

mod helpers;

use std::time::Duration;

use helpers::{inbound_text, spawn_capture_server, wait_until, TestApp, WUID};
use serde_json::json;
use wr_common::{
    Chat, ConnectionState, Contact, MessageKey, MessageSource, MessageStatus, MessageUpdate, MessageUpdateFields,
    PresenceUpdate,
};
use wr_server::store::MessageClass;
use wr_server::webhooks::{EnabledEvents, GlobalWebhook, WebhookEvent};
use wr_server::whatsapp::{ConnectionEvent, UpsertType};

const PEER: &str = "5511888888888@s.whatsapp.net";

#[tokio::test]
async fn live_message_is_stored_and_relayed() {
    let (server, captured) = spawn_capture_server().await;
    let app = TestApp::with_webhooks(
        GlobalWebhook {
            enabled: true,
            url: Some(format!("{}/global", server.url)),
        },
        EnabledEvents::all(),
    )
    .await;
    let (_instance, session) = app.open_instance("acct1").await;

    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![inbound_text("ABC123", PEER, "hello")],
            kind: UpsertType::Notify,
        })
        .await;

    let delivered = captured.wait_for("messages.upsert", 1).await;
    let stored = app.records.messages();
    assert_eq!(stored.len(), 1);
    let record = &stored[0];
    assert_eq!(record.owner, WUID);
    assert_eq!(record.message_timestamp, 1_700_000_000);
    assert_eq!(record.source, Some(MessageSource::Web));
    assert_eq!(record.class, Some(MessageClass::NewMessage));
    assert_eq!(record.message, json!({ "conversation": "hello" }));

    let hook = &delivered[0];
    assert_eq!(hook.path, "/global");
    assert_eq!(hook.owner.as_deref(), Some(WUID));
    assert_eq!(hook.body["instance"], "acct1");
    assert_eq!(hook.body["data"]["key"]["id"], "ABC123");
    assert_eq!(hook.body["data"]["messageTimestamp"], 1_700_000_000);
    assert_eq!(hook.body["data"]["source"], "web");
}

#[tokio::test]
async fn repeated_open_does_not_double_deliver() {
    let (server, captured) = spawn_capture_server().await;
    let app = TestApp::with_webhooks(
        GlobalWebhook {
            enabled: true,
            url: Some(format!("{}/global", server.url)),
        },
        EnabledEvents::none().with(WebhookEvent::MessagesUpsert),
    )
    .await;
    let (_instance, session) = app.open_instance("acct1").await;

    session.emit_state(ConnectionState::Open, None).await;
    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![inbound_text("ONCE", PEER, "hello")],
            kind: UpsertType::Notify,
        })
        .await;

    captured.wait_for("messages.upsert", 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(captured.of("messages.upsert").len(), 1);
    assert_eq!(app.records.messages().len(), 1);
}

#[tokio::test]
async fn live_duplicate_key_is_stored_once() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("acct1").await;

    for text in ["first", "again"] {
        session
            .emit(ConnectionEvent::MessagesUpsert {
                messages: vec![inbound_text("DUP1", PEER, text)],
                kind: UpsertType::Notify,
            })
            .await;
    }
    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![inbound_text("AFTER", PEER, "later")],
            kind: UpsertType::Notify,
        })
        .await;

    wait_until(|| app.records.messages().iter().any(|m| m.key.id == "AFTER")).await;
    let stored = app.records.messages();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].key.id, "DUP1");
    assert_eq!(stored[0].message, json!({ "conversation": "first" }));
}

#[tokio::test]
async fn append_upserts_are_ignored() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("acct1").await;

    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![inbound_text("OLD", PEER, "backfill")],
            kind: UpsertType::Append,
        })
        .await;
    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![inbound_text("NEW", PEER, "live")],
            kind: UpsertType::Notify,
        })
        .await;

    wait_until(|| !app.records.messages().is_empty()).await;
    let ids: Vec<String> = app.records.messages().into_iter().map(|m| m.key.id).collect();
    assert_eq!(ids, vec!["NEW".to_string()]);
}

#[tokio::test]
async fn protocol_messages_are_dropped() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("acct1").await;

    let mut control = inbound_text("CTRL", PEER, "");
    control.message = Some(json!({ "protocolMessage": { "type": 0 } }));
    session
        .emit(ConnectionEvent::MessagesUpsert {
            messages: vec![control, inbound_text("REAL", PEER, "hi")],
            kind: UpsertType::Notify,
        })
        .await;

    wait_until(|| !app.records.messages().is_empty()).await;
    let ids: Vec<String> = app.records.messages().into_iter().map(|m| m.key.id).collect();
    assert_eq!(ids, vec!["REAL".to_string()]);
}

#[tokio::test]
async fn history_sync_skips_known_messages() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("acct1").await;

    session
        .emit(ConnectionEvent::MessagesSet {
            messages: vec![inbound_text("H1", PEER, "one"), inbound_text("H2", PEER, "two")],
            is_latest: true,
        })
        .await;
    wait_until(|| app.records.messages().len() == 2).await;

    session
        .emit(ConnectionEvent::MessagesSet {
            messages: vec![
                inbound_text("H2", PEER, "two"),
                inbound_text("H3", PEER, "three"),
                inbound_text("H3", PEER, "three"),
            ],
            is_latest: false,
        })
        .await;
    wait_until(|| app.records.messages().len() >= 3).await;

    let mut ids: Vec<String> = app.records.messages().into_iter().map(|m| m.key.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["H1", "H2", "H3"]);
    assert!(app
        .records
        .messages()
        .iter()
        .all(|m| m.class == Some(MessageClass::OldMessage) && m.source.is_none()));
}

#[tokio::test]
async fn status_updates_become_named_statuses() {
    let (server, captured) = spawn_capture_server().await;
    let app = TestApp::with_webhooks(
        GlobalWebhook {
            enabled: true,
            url: Some(format!("{}/global", server.url)),
        },
        EnabledEvents::all(),
    )
    .await;
    let (_instance, session) = app.open_instance("acct1").await;

    let update = |remote_jid: &str, status: Option<u8>| MessageUpdate {
        key: MessageKey {
            id: "ABC123".into(),
            remote_jid: remote_jid.into(),
            from_me: true,
            participant: None,
        },
        update: MessageUpdateFields { status },
    };
    session
        .emit(ConnectionEvent::MessagesUpdate(vec![
            update("status@broadcast", Some(3)),
            update(PEER, None),
            update(PEER, Some(4)),
        ]))
        .await;

    let delivered = captured.wait_for("messages.update", 2).await;
    assert_eq!(delivered[0].body["data"]["status"], json!(null));
    assert_eq!(delivered[1].body["data"]["status"], "READ");

    let updates = app.records.message_updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].status, None);
    assert_eq!(updates[1].status, Some(MessageStatus::Read));
    assert!(updates.iter().all(|u| u.remote_jid == PEER && u.owner == WUID));
    assert!(updates.iter().all(|u| u.datetime > 0));
}

#[tokio::test]
async fn contacts_upsert_keeps_known_contacts() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("acct1").await;

    let contact = |id: &str, notify: &str| Contact {
        id: id.into(),
        notify: Some(notify.into()),
        ..Default::default()
    };
    session
        .emit(ConnectionEvent::ContactsUpsert(vec![contact(PEER, "Ana")]))
        .await;
    wait_until(|| app.records.contacts().len() == 1).await;

    session
        .emit(ConnectionEvent::ContactsUpsert(vec![
            contact(PEER, "Ana Renamed"),
            contact("5511777777777@s.whatsapp.net", "Bia"),
        ]))
        .await;
    wait_until(|| app.records.contacts().len() == 2).await;

    let contacts = app.records.contacts();
    let ana = contacts.iter().find(|c| c.id == PEER).unwrap();
    assert_eq!(ana.push_name.as_deref(), Some("Ana"));
    assert_eq!(
        ana.profile_picture_url.as_deref(),
        Some(format!("https://pps.whatsapp.net/v/{PEER}.jpg").as_str())
    );
    assert!(contacts.iter().all(|c| c.owner == WUID));
}

#[tokio::test]
async fn contacts_update_overwrites() {
    let app = TestApp::new().await;
    let (_instance, session) = app.open_instance("acct1").await;

    session
        .emit(ConnectionEvent::ContactsUpsert(vec![Contact {
            id: PEER.into(),
            notify: Some("Ana".into()),
            ..Default::default()
        }]))
        .await;
    wait_until(|| app.records.contacts().len() == 1).await;

    session
        .emit(ConnectionEvent::ContactsUpdate(vec![Contact {
            id: PEER.into(),
            verified_name: Some("Ana Ltda".into()),
            ..Default::default()
        }]))
        .await;

    wait_until(|| {
        app.records
            .contacts()
            .first()
            .is_some_and(|c| c.push_name.as_deref() == Some("Ana Ltda"))
    })
    .await;
}

#[tokio::test]
async fn chats_set_waits_for_latest_batch() {
    let (server, captured) = spawn_capture_server().await;
    let app = TestApp::with_webhooks(
        GlobalWebhook {
            enabled: true,
            url: Some(format!("{}/global", server.url)),
        },
        EnabledEvents::all(),
    )
    .await;
    let (_instance, session) = app.open_instance("acct1").await;

    session
        .emit(ConnectionEvent::ChatsSet {
            chats: vec![Chat { id: "stale@s.whatsapp.net".into() }],
            is_latest: false,
        })
        .await;
    session
        .emit(ConnectionEvent::ChatsSet {
            chats: vec![Chat { id: PEER.into() }],
            is_latest: true,
        })
        .await;

    let delivered = captured.wait_for("chats.set", 1).await;
    assert_eq!(
        delivered[0].body["data"],
        json!([{ "id": PEER, "owner": WUID }])
    );
    let chats = app.records.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id, PEER);
}

#[tokio::test]
async fn presence_is_relayed_untouched() {
    let (server, captured) = spawn_capture_server().await;
    let app = TestApp::with_webhooks(
        GlobalWebhook {
            enabled: true,
            url: Some(format!("{}/global", server.url)),
        },
        EnabledEvents::all(),
    )
    .await;
    let (_instance, session) = app.open_instance("acct1").await;

    let presences = json!({ PEER: { "lastKnownPresence": "composing" } });
    session
        .emit(ConnectionEvent::PresenceUpdate(PresenceUpdate {
            id: PEER.into(),
            presences: presences.clone(),
        }))
        .await;

    let delivered = captured.wait_for("presence.update", 1).await;
    assert_eq!(delivered[0].body["data"]["id"], PEER);
    assert_eq!(delivered[0].body["data"]["presences"], presences);
}
