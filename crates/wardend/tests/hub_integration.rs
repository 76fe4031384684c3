//! Integration tests for the moderator push hub.
//!
//! Most tests drive the hub over in-memory duplex pipes so they can hand a
//! chosen user id straight to `create_client`. The listener tests go over
//! real TCP to exercise the header check.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::DuplexStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

use warden_core::{OnlinePlayer, ServerId, UserId};
use warden_protocol::{ChatRequest, OutboundMessage};
use wardend::events::{ChatEvent, ChatSendEvent, EventBus, ServerStatusEvent};
use wardend::hub::{bridge_events, spawn_hub, ChatSink, HubHandle, HubServer, DEFAULT_USER_HEADER};
use wardend::repository::{AccessPolicy, AllowAll};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single expected frame
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between state checks while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Default)]
struct RecordingChatSink {
    received: Mutex<Vec<(UserId, ChatRequest)>>,
}

impl RecordingChatSink {
    fn received(&self) -> Vec<(UserId, ChatRequest)> {
        self.received.lock().unwrap().clone()
    }

    async fn wait_for(&self, count: usize) -> Vec<(UserId, ChatRequest)> {
        let start = tokio::time::Instant::now();
        while start.elapsed() < RECV_TIMEOUT {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!("chat sink saw {:?}, wanted {count}", self.received());
    }
}

impl ChatSink for RecordingChatSink {
    fn send_chat(&self, user: &UserId, request: ChatRequest) {
        self.received.lock().unwrap().push((user.clone(), request));
    }
}

/// Hides chat from one user.
struct DenyUser(UserId);

impl AccessPolicy for DenyUser {
    fn can_view_chat(&self, user: &UserId, _server: ServerId) -> bool {
        *user != self.0
    }
}

type TestSocket = WebSocketStream<DuplexStream>;

fn start_hub() -> (HubHandle, Arc<RecordingChatSink>) {
    let sink = Arc::new(RecordingChatSink::default());
    let hub = spawn_hub(sink.clone());
    (hub, sink)
}

/// Registers a server-side socket for `user` and returns the client side.
async fn connect(hub: &HubHandle, user: &str) -> TestSocket {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    hub.create_client(UserId::from(user), server_ws)
        .await
        .expect("register client");
    client_ws
}

async fn recv_json<S>(ws: &mut WebSocketStream<S>) -> Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("valid json");
        }
    }
}

async fn send_json<S>(ws: &mut WebSocketStream<S>, value: Value)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    ws.send(Message::text(value.to_string())).await.expect("send frame");
}

async fn wait_for_count(hub: &HubHandle, expected: usize) {
    let start = tokio::time::Instant::now();
    while start.elapsed() < RECV_TIMEOUT {
        if hub.client_count().await.unwrap() == expected {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }
    panic!(
        "client count stayed at {}, wanted {expected}",
        hub.client_count().await.unwrap()
    );
}

fn marker() -> OutboundMessage {
    OutboundMessage::server_status(ServerId::new(999), false)
}

// ============================================================================
// Inbound Frames
// ============================================================================

#[tokio::test]
async fn test_ping_gets_pong() {
    let (hub, _sink) = start_hub();
    let mut ws = connect(&hub, "alice").await;

    send_json(&mut ws, json!({"type": "ping", "body": ""})).await;

    assert_eq!(recv_json(&mut ws).await, json!({"type": "pong", "body": ""}));
}

#[tokio::test]
async fn test_chat_uses_authenticated_user() {
    let (hub, sink) = start_hub();
    let mut ws = connect(&hub, "alice").await;

    send_json(
        &mut ws,
        json!({"type": "chat", "body": {"server_id": 3, "message": "behave"}}),
    )
    .await;

    let received = sink.wait_for(1).await;
    assert_eq!(received[0].0, UserId::from("alice"));
    assert_eq!(
        received[0].1,
        ChatRequest {
            server_id: ServerId::new(3),
            message: "behave".to_string(),
        }
    );
}

#[tokio::test]
async fn test_bad_frames_do_not_end_the_session() {
    let (hub, sink) = start_hub();
    let mut ws = connect(&hub, "alice").await;

    ws.send(Message::text("not json")).await.unwrap();
    send_json(&mut ws, json!({"type": "chat", "body": {"message": "no server"}})).await;
    send_json(&mut ws, json!({"type": "subscribe", "body": {}})).await;
    send_json(&mut ws, json!({"type": "ping"})).await;

    assert_eq!(recv_json(&mut ws).await["type"], "pong");
    assert!(sink.received().is_empty());
    assert_eq!(hub.client_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_close_unregisters_client() {
    let (hub, _sink) = start_hub();
    let mut ws = connect(&hub, "alice").await;
    let _other = connect(&hub, "bob").await;
    assert_eq!(hub.client_count().await.unwrap(), 2);

    ws.close(None).await.unwrap();

    wait_for_count(&hub, 1).await;
}

#[tokio::test]
async fn test_dropped_socket_unregisters_client() {
    let (hub, _sink) = start_hub();
    let ws = connect(&hub, "alice").await;
    drop(ws);

    wait_for_count(&hub, 0).await;
}

// ============================================================================
// Outbound Routing
// ============================================================================

#[tokio::test]
async fn test_broadcast_reaches_every_client_once() {
    let (hub, _sink) = start_hub();
    let mut a = connect(&hub, "alice").await;
    let mut b = connect(&hub, "bob").await;

    hub.broadcast(&OutboundMessage::server_status(ServerId::new(1), true))
        .await
        .unwrap();
    hub.broadcast(&marker()).await.unwrap();

    for ws in [&mut a, &mut b] {
        let first = recv_json(&mut *ws).await;
        assert_eq!(first["type"], "server-status");
        assert_eq!(first["body"]["server_id"], 1);
        assert_eq!(first["body"]["online"], true);
        assert_eq!(recv_json(&mut *ws).await["body"]["server_id"], 999);
    }
}

#[tokio::test]
async fn test_direct_message_reaches_every_connection_of_user() {
    let (hub, _sink) = start_hub();
    let mut alice_tab1 = connect(&hub, "alice").await;
    let mut alice_tab2 = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;

    hub.send_direct_message(
        UserId::from("alice"),
        &OutboundMessage::server_status(ServerId::new(5), true),
    )
    .await
    .unwrap();
    hub.broadcast(&marker()).await.unwrap();

    assert_eq!(recv_json(&mut alice_tab1).await["body"]["server_id"], 5);
    assert_eq!(recv_json(&mut alice_tab2).await["body"]["server_id"], 5);
    assert_eq!(recv_json(&mut bob).await["body"]["server_id"], 999);
}

#[tokio::test]
async fn test_filtered_broadcast() {
    let (hub, _sink) = start_hub();
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;

    hub.broadcast_server_message(
        &OutboundMessage::server_status(ServerId::new(2), false),
        |user| user.as_str() == "bob",
    )
    .await
    .unwrap();
    hub.broadcast(&marker()).await.unwrap();

    assert_eq!(recv_json(&mut bob).await["body"]["server_id"], 2);
    assert_eq!(recv_json(&mut alice).await["body"]["server_id"], 999);
}

// ============================================================================
// Event Bridge
// ============================================================================

#[tokio::test]
async fn test_bridge_forwards_status_events() {
    let (hub, _sink) = start_hub();
    let events = EventBus::new();
    bridge_events(&events, hub.clone(), Arc::new(AllowAll));
    let mut ws = connect(&hub, "alice").await;

    events.publish_server_status(&ServerStatusEvent {
        server_id: ServerId::new(4),
        online: false,
        at: Utc::now(),
    });

    assert_eq!(
        recv_json(&mut ws).await,
        json!({"type": "server-status", "body": {"server_id": 4, "online": false}})
    );
}

#[tokio::test]
async fn test_bridge_applies_chat_access_policy() {
    let (hub, _sink) = start_hub();
    let events = EventBus::new();
    bridge_events(&events, hub.clone(), Arc::new(DenyUser(UserId::from("bob"))));
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;

    events.publish_chat(&ChatEvent {
        server_id: ServerId::new(1),
        player: OnlinePlayer::new("AAA1", "Alice"),
        message: "gg".to_string(),
        at: Utc::now(),
    });
    hub.broadcast(&marker()).await.unwrap();

    let chat = recv_json(&mut alice).await;
    assert_eq!(chat["type"], "chat");
    assert_eq!(chat["body"]["message"], "gg");
    assert_eq!(recv_json(&mut bob).await["body"]["server_id"], 999);
}

#[tokio::test]
async fn test_bridge_applies_chat_access_policy_to_moderator_chat() {
    let (hub, _sink) = start_hub();
    let events = EventBus::new();
    bridge_events(&events, hub.clone(), Arc::new(DenyUser(UserId::from("bob"))));
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;

    events.publish_chat_send(&ChatSendEvent {
        server_id: ServerId::new(1),
        user_id: UserId::from("carol"),
        sender: "Mod Carol".to_string(),
        message: "last warning".to_string(),
        at: Utc::now(),
    });
    hub.broadcast(&marker()).await.unwrap();

    let chat = recv_json(&mut alice).await;
    assert_eq!(chat["type"], "chat-send");
    assert_eq!(chat["body"]["sender"], "Mod Carol");
    assert_eq!(chat["body"]["user_id"], "carol");
    assert_eq!(recv_json(&mut bob).await["body"]["server_id"], 999);
}

// ============================================================================
// Listener
// ============================================================================

async fn spawn_server(hub: HubHandle) -> (String, CancellationToken) {
    let cancel = CancellationToken::new();
    let server = HubServer::bind("127.0.0.1:0", DEFAULT_USER_HEADER, hub, cancel.clone())
        .await
        .expect("bind hub server");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    (format!("ws://{addr}/"), cancel)
}

#[tokio::test]
async fn test_listener_authenticates_from_header() {
    let (hub, sink) = start_hub();
    let (url, cancel) = spawn_server(hub.clone()).await;

    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert(DEFAULT_USER_HEADER, HeaderValue::from_static("carol"));
    let (mut ws, _response) = connect_async(request).await.expect("upgrade");

    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");

    send_json(
        &mut ws,
        json!({"type": "chat", "body": {"server_id": 1, "message": "hi"}}),
    )
    .await;
    let received = sink.wait_for(1).await;
    assert_eq!(received[0].0, UserId::from("carol"));

    cancel.cancel();
}

#[tokio::test]
async fn test_listener_rejects_missing_header() {
    let (hub, _sink) = start_hub();
    let (url, cancel) = spawn_server(hub.clone()).await;

    let err = connect_async(url.as_str()).await.expect_err("must be rejected");

    assert!(err.to_string().contains("401"), "unexpected error: {err}");
    assert_eq!(hub.client_count().await.unwrap(), 0);

    cancel.cancel();
}
