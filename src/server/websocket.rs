//! Realtime presence gateway
//!
//! `GET /ws?token=<access token>` upgrades to a WebSocket. The token is
//! checked after the upgrade so a failure can be reported with a close code:
//!
//! - 4001: no token
//! - 4002: token rejected
//!
//! Messages (server → client):
//! - `connected` - `{principalId, canSeeStatus}` once authenticated
//! - `userStatusChanged` - `{principalId, isOnline}`, only when `canSeeStatus`
//! - `echo` - `{message}` for any other client text frame
//! - `pong` - reply to `{"type":"ping"}`
//!
//! Each open socket counts as one connection of its principal in the
//! presence registry for as long as the socket task runs.

use futures_util::{SinkExt, StreamExt};
use hyper::body::Incoming;
use hyper::{Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::auth::extract_token_from_query;
use crate::presence::StatusChanged;
use crate::routes::{empty_body, error_response, BoxBody};
use crate::server::AppState;
use crate::types::WicketError;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Permission that lets a connection watch other principals come and go
pub const STATUS_PERMISSION: &str = "user.read";

pub const CLOSE_NO_TOKEN: u16 = 4001;
pub const CLOSE_INVALID_TOKEN: u16 = 4002;

/// Message sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    Connected {
        principal_id: String,
        can_see_status: bool,
    },
    UserStatusChanged {
        principal_id: String,
        is_online: bool,
    },
    Echo {
        message: String,
    },
    Pong,
}

impl From<StatusChanged> for ServerFrame {
    fn from(event: StatusChanged) -> Self {
        ServerFrame::UserStatusChanged {
            principal_id: event.principal_id,
            is_online: event.is_online,
        }
    }
}

/// Message sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientFrame {
    Ping,
}

/// Reply to one inbound text frame
fn reply_to(text: String) -> ServerFrame {
    match serde_json::from_str::<ClientFrame>(&text) {
        Ok(ClientFrame::Ping) => ServerFrame::Pong,
        Err(_) => ServerFrame::Echo { message: text },
    }
}

/// Handle `GET /ws`
pub fn handle_upgrade(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(WicketError::BadRequest(
            "WebSocket upgrade required".to_string(),
        ));
    }

    let token = extract_token_from_query(req.uri().query());

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok((resp, ws)) => (resp, ws),
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return error_response(WicketError::BadRequest(format!(
                "WebSocket upgrade failed: {e}"
            )));
        }
    };

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = handle_connection(ws, state, token).await {
                    debug!("Realtime connection ended with error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, empty_body())
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<HyperWebSocket, WsMessage>,
    frame: &ServerFrame,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = serde_json::to_string(frame)?;
    sender.send(WsMessage::Text(json)).await?;
    Ok(())
}

async fn close_with(
    mut ws: HyperWebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    ws.close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    }))
    .await?;
    Ok(())
}

/// Serve one authenticated-or-rejected socket until either side leaves
async fn handle_connection(
    ws: HyperWebSocket,
    state: Arc<AppState>,
    token: Option<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(token) = token else {
        debug!("Realtime connection without token");
        return close_with(ws, CLOSE_NO_TOKEN, "Authentication required").await;
    };

    let session = match state.sessions.authenticate(&token).await {
        Ok(s) => s,
        Err(e) => {
            debug!("Realtime connection rejected: {}", e);
            return close_with(ws, CLOSE_INVALID_TOKEN, "Invalid token").await;
        }
    };
    let principal_id = session.id().to_string();

    let can_see_status = match state
        .sessions
        .resolver()
        .has_permission(&principal_id, STATUS_PERMISSION)
        .await
    {
        Ok(allowed) => allowed,
        Err(e) => {
            warn!(principal = %principal_id, "Permission lookup failed, status feed disabled: {}", e);
            false
        }
    };

    // Subscribe before registering so this socket sees its own arrival
    let mut events = can_see_status.then(|| state.presence.subscribe());

    let (mut sender, mut receiver) = ws.split();
    send_frame(
        &mut sender,
        &ServerFrame::Connected {
            principal_id: principal_id.clone(),
            can_see_status,
        },
    )
    .await?;

    let _presence = state.presence.connect(&principal_id);
    info!(principal = %principal_id, can_see_status, "Realtime client connected");

    let idle_timeout = state.args.ws_idle_timeout();
    let mut deadline = Instant::now() + idle_timeout;

    loop {
        tokio::select! {
            event = next_event(&mut events) => {
                match event {
                    Ok(changed) => {
                        if send_frame(&mut sender, &ServerFrame::from(changed)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(principal = %principal_id, skipped, "Presence feed lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                deadline = Instant::now() + idle_timeout;
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if send_frame(&mut sender, &reply_to(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) => break,
                    Some(Err(e)) => {
                        debug!(principal = %principal_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            _ = sleep_until(deadline) => {
                debug!(principal = %principal_id, "Realtime connection idle, closing");
                let _ = sender
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "Idle timeout".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    info!(principal = %principal_id, "Realtime client disconnected");
    Ok(())
}

/// Next presence event, or never when this connection has no feed
async fn next_event(
    events: &mut Option<broadcast::Receiver<StatusChanged>>,
) -> Result<StatusChanged, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_shapes() {
        let connected = serde_json::to_value(ServerFrame::Connected {
            principal_id: "p-1".into(),
            can_see_status: true,
        })
        .unwrap();
        assert_eq!(
            connected,
            serde_json::json!({"type": "connected", "principalId": "p-1", "canSeeStatus": true})
        );

        let changed = serde_json::to_value(ServerFrame::from(StatusChanged {
            principal_id: "p-2".into(),
            is_online: false,
        }))
        .unwrap();
        assert_eq!(
            changed,
            serde_json::json!({"type": "userStatusChanged", "principalId": "p-2", "isOnline": false})
        );

        assert_eq!(
            serde_json::to_value(ServerFrame::Pong).unwrap(),
            serde_json::json!({"type": "pong"})
        );
    }

    #[test]
    fn test_ping_answered_everything_else_echoed() {
        assert_eq!(reply_to(r#"{"type":"ping"}"#.into()), ServerFrame::Pong);
        assert_eq!(
            reply_to("hello".into()),
            ServerFrame::Echo {
                message: "hello".into()
            }
        );
        assert_eq!(
            reply_to(r#"{"type":"subscribe"}"#.into()),
            ServerFrame::Echo {
                message: r#"{"type":"subscribe"}"#.into()
            }
        );
    }
}
