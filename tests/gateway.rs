//! Realtime gateway integration tests
//!
//! Real WebSocket clients against a dev-mode server: close codes, the
//! connected handshake, presence fan-out and the echo protocol.

mod common;

use common::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn open(addr: SocketAddr, query: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws{query}")).await.unwrap();
    ws
}

async fn open_as(addr: SocketAddr, email: &str, password: &str) -> (Client, Value) {
    let token = access_token(addr, email, password).await;
    let mut ws = open(addr, &format!("?token={token}")).await;
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "connected", "{connected}");
    (ws, connected)
}

/// Next text frame as JSON, skipping control frames
async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Close code of the next close frame
async fn close_code(ws: &mut Client) -> u16 {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Close(frame) = msg {
            return frame.map(|f| u16::from(f.code)).unwrap_or(1005);
        }
    }
}

fn status(principal_id: &str, is_online: bool) -> Value {
    json!({ "type": "userStatusChanged", "principalId": principal_id, "isOnline": is_online })
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn test_missing_token_closes_4001() {
    let (addr, _state) = start().await;

    let mut ws = open(addr, "").await;
    assert_eq!(close_code(&mut ws).await, 4001);
}

#[tokio::test]
async fn test_invalid_token_closes_4002() {
    let (addr, _state) = start().await;

    let mut ws = open(addr, "?token=not.a.token").await;
    assert_eq!(close_code(&mut ws).await, 4002);
}

#[tokio::test]
async fn test_revoked_token_closes_4002() {
    let (addr, _state) = start().await;

    let token = access_token(addr, DEMO_EMAIL, DEMO_PASSWORD).await;
    let bearer = format!("Bearer {token}");
    let logout = request(addr, "POST", "/api/v1/auth/logout", &[("Authorization", &bearer)], None).await;
    assert_eq!(logout.status, 200);

    let mut ws = open(addr, &format!("?token={token}")).await;
    assert_eq!(close_code(&mut ws).await, 4002);
}

#[tokio::test]
async fn test_connected_frame_reports_status_visibility() {
    let (addr, _state) = start().await;

    let (_admin, connected) = open_as(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(connected["canSeeStatus"], true);
    assert!(connected["principalId"].is_string());

    let (_guest, connected) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;
    assert_eq!(connected["canSeeStatus"], false);
    assert_eq!(connected["principalId"], "guest-1");
}

// =============================================================================
// Presence fan-out
// =============================================================================

#[tokio::test]
async fn test_watcher_sees_arrivals_and_departures() {
    let (addr, state) = start().await;

    let (mut admin, connected) = open_as(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let admin_id = connected["principalId"].as_str().unwrap().to_string();
    assert_eq!(next_json(&mut admin).await, status(&admin_id, true));

    let (mut guest, _) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;
    assert_eq!(next_json(&mut admin).await, status("guest-1", true));
    assert!(state.presence.is_online("guest-1"));

    guest.close(None).await.unwrap();
    assert_eq!(next_json(&mut admin).await, status("guest-1", false));
}

#[tokio::test]
async fn test_second_socket_of_same_principal_is_not_an_event() {
    let (addr, state) = start().await;

    let (mut admin, connected) = open_as(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let admin_id = connected["principalId"].as_str().unwrap().to_string();
    assert_eq!(next_json(&mut admin).await, status(&admin_id, true));

    let (mut first, _) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;
    assert_eq!(next_json(&mut admin).await, status("guest-1", true));

    let (mut second, _) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;
    // A pong means the server has registered the second socket
    second.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
    assert_eq!(next_json(&mut second).await, json!({ "type": "pong" }));
    assert_eq!(state.presence.connection_count("guest-1"), 2);

    first.close(None).await.unwrap();
    second.close(None).await.unwrap();

    // Only the last socket going away produces the next event
    assert_eq!(next_json(&mut admin).await, status("guest-1", false));
    assert!(!state.presence.is_online("guest-1"));
}

#[tokio::test]
async fn test_dropped_socket_goes_offline_exactly_once() {
    let (addr, state) = start().await;

    let (mut admin, connected) = open_as(addr, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let admin_id = connected["principalId"].as_str().unwrap().to_string();
    assert_eq!(next_json(&mut admin).await, status(&admin_id, true));

    let (guest, _) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;
    assert_eq!(next_json(&mut admin).await, status("guest-1", true));

    // No close handshake, the TCP stream just goes away
    drop(guest);
    assert_eq!(next_json(&mut admin).await, status("guest-1", false));
    assert_eq!(state.presence.connection_count("guest-1"), 0);

    // The pong arrives with no second offline event ahead of it
    admin.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
    assert_eq!(next_json(&mut admin).await, json!({ "type": "pong" }));
    assert_eq!(state.presence.connection_count("guest-1"), 0);
    assert!(!state.presence.is_online("guest-1"));
}

#[tokio::test]
async fn test_connection_without_permission_gets_no_status_frames() {
    let (addr, _state) = start().await;

    let (mut guest, _) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;
    let (_demo, _) = open_as(addr, DEMO_EMAIL, DEMO_PASSWORD).await;

    // The first frame after the handshake is the echo, not a status change
    guest.send(Message::Text("marker".into())).await.unwrap();
    assert_eq!(next_json(&mut guest).await, json!({ "type": "echo", "message": "marker" }));
}

// =============================================================================
// Client messages
// =============================================================================

#[tokio::test]
async fn test_ping_and_echo() {
    let (addr, _state) = start().await;

    let (mut guest, _) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;

    guest.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
    assert_eq!(next_json(&mut guest).await, json!({ "type": "pong" }));

    guest.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(next_json(&mut guest).await, json!({ "type": "echo", "message": "hello" }));
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let (addr, state) = start_with(&["--ws-idle-timeout-secs", "1"]).await;

    let (mut guest, _) = open_as(addr, GUEST_EMAIL, GUEST_PASSWORD).await;
    assert_eq!(close_code(&mut guest).await, 1000);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!state.presence.is_online("guest-1"));
}
