use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use openmates_core::config::{HANDSHAKE_TIMEOUT_MS, HEARTBEAT_INTERVAL_SECS, MAX_PAYLOAD_BYTES};
use openmates_core::error::{OpenMatesError, Result};
use openmates_protocol::actions::CONNECT;
use openmates_protocol::frames::{ErrorFrame, EventFrame, InboundFrame};
use openmates_protocol::handshake::ConnectPayload;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::{dispatch, handshake, send};

/// WS connection state machine: `AwaitingConnect` until the `connect` frame
/// resolves an identity, then `Authenticated` for the rest of the session
/// (connect sequence). There is no `Closing` state — a break out
/// of the select loop handles teardown directly.
enum ConnState {
    AwaitingConnect,
    Authenticated(handshake::DeviceSession),
}

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task — lives for the entire WS session lifetime.
async fn handle_connection(socket: WebSocket, app: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();
    let mut state = ConnState::AwaitingConnect;
    let mut outbound: Option<tokio::sync::mpsc::Receiver<String>> = None;

    let handshake_deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(HANDSHAKE_TIMEOUT_MS);
    let mut handshake_timer = Box::pin(tokio::time::sleep_until(handshake_deadline));

    let mut tick_interval = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_ref: &str = &text;
                        if text_ref.len() > MAX_PAYLOAD_BYTES {
                            warn!(size = text_ref.len(), "payload too large, closing connection");
                            break;
                        }

                        if matches!(state, ConnState::AwaitingConnect) {
                            match try_authenticate(&app, text_ref).await {
                                Ok((session, ack)) => {
                                    if send::json(&mut tx, &ack).await.is_err() {
                                        break;
                                    }
                                    outbound = Some(app.connections.register(&session.user_id, &session.conn_id));
                                    for payload in app.pending_delivery.replay(&session.user_id) {
                                        if tx.send(Message::Text(payload.to_string().into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    info!(user_id = %session.user_id, conn_id = %session.conn_id, "connection authenticated");
                                    state = ConnState::Authenticated(session);
                                }
                                Err(err) => {
                                    let _ = send::json(&mut tx, &ErrorFrame::from_error(&err)).await;
                                    break;
                                }
                            }
                        } else if let ConnState::Authenticated(ref session) = state {
                            let response = dispatch::handle(&app, session, text_ref).await;
                            if send::json(&mut tx, &response).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }

            event = recv_outbound(&mut outbound) => {
                match event {
                    Some(payload) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = tick_interval.tick() => {
                if let ConnState::Authenticated(_) = state {
                    let tick = EventFrame::new("tick").with_timestamp(openmates_core::types::now_millis());
                    if send::json(&mut tx, &tick).await.is_err() {
                        break;
                    }
                }
            }

            _ = &mut handshake_timer => {
                if matches!(state, ConnState::AwaitingConnect) {
                    warn!("handshake timeout, closing connection");
                    break;
                }
            }
        }
    }

    if let ConnState::Authenticated(session) = &state {
        app.connections.unregister(&session.user_id, &session.conn_id);
        info!(user_id = %session.user_id, conn_id = %session.conn_id, "connection closed");
    }
}

/// Polls the outbound fan-out channel once it exists; before authentication
/// there is nothing to poll, so this future never resolves and the branch
/// simply never fires.
async fn recv_outbound(outbound: &mut Option<tokio::sync::mpsc::Receiver<String>>) -> Option<String> {
    match outbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn try_authenticate(
    app: &AppState,
    text: &str,
) -> Result<(handshake::DeviceSession, openmates_protocol::handshake::ConnectedAck)> {
    let frame: InboundFrame = serde_json::from_str(text).map_err(|e| OpenMatesError::Malformed(e.to_string()))?;
    if frame.frame_type != CONNECT {
        return Err(OpenMatesError::NotAuthenticated);
    }
    let payload: ConnectPayload = serde_json::from_value(frame.payload).map_err(|e| OpenMatesError::Malformed(e.to_string()))?;
    handshake::authenticate(app, &payload).await
}
