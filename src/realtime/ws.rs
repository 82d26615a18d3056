//! WebSocket Transport
//! Mission: One task per connection; in-band authentication and topic joins,
//! tick snapshots fanned out to every live socket
//!
//! Every connection subscribes to the tick broadcast channel at upgrade
//! time, before it has authenticated. Topic joins only update registry
//! bookkeeping; the per-tick payload is always the full snapshot.

use crate::{
    api::AppState,
    models::{is_supported_symbol, WsClientEvent, WsServerEvent},
};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let connection_id = state.registry.on_connect();
    let mut rx = state.market.price_tx.subscribe();
    info!("🔌 New client connected: {}", connection_id);

    // Immediately send the current snapshot so the client has prices before
    // the next tick lands.
    let hello = WsServerEvent::PriceUpdate {
        prices: state.market.store.snapshot(),
        timestamp: Utc::now().timestamp_millis(),
    };
    if send_event(&mut socket, &hello).await.is_err() {
        state.registry.on_disconnect(connection_id);
        return;
    }

    loop {
        tokio::select! {
            // Tick snapshots for this connection
            Ok(event) = rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            // Inbound events from the client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_event(&state, connection_id, &text) {
                            if send_event(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Socket error on {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    }

    state.registry.on_disconnect(connection_id);
    info!("🔌 Client disconnected: {}", connection_id);
}

/// Process one inbound frame; the returned event, if any, goes back to this
/// connection only.
pub fn handle_client_event(
    state: &AppState,
    connection_id: Uuid,
    text: &str,
) -> Option<WsServerEvent> {
    let event: WsClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(_) => {
            debug!("Unparseable frame from {}: {}", connection_id, text);
            return None;
        }
    };

    match event {
        WsClientEvent::Authenticate { token } => {
            // Malformed or expired tokens yield None, never an error; a
            // failed attempt leaves the connection open and unauthenticated.
            match state.auth.jwt_handler.verify_token(&token) {
                Some(claims) => {
                    state.registry.authenticate(connection_id, &claims.sub);
                    Some(WsServerEvent::Authenticated {
                        user_id: claims.sub,
                    })
                }
                None => {
                    warn!("Authentication failed for connection {}", connection_id);
                    Some(WsServerEvent::AuthError {
                        reason: "Invalid token".to_string(),
                    })
                }
            }
        }
        WsClientEvent::Subscribe { symbol } => {
            if !is_supported_symbol(&symbol) {
                debug!("Ignoring subscribe to unsupported symbol {}", symbol);
                return None;
            }
            // Join is a no-op for unauthenticated sessions; no ack either way.
            state.registry.subscribe(connection_id, &symbol);
            None
        }
        WsClientEvent::Unsubscribe { symbol } => {
            state.registry.unsubscribe(connection_id, &symbol);
            None
        }
        WsClientEvent::Ping { timestamp } => Some(WsServerEvent::Pong {
            timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
        }),
    }
}

async fn send_event(socket: &mut WebSocket, event: &WsServerEvent) -> Result<(), axum::Error> {
    let msg = serde_json::to_string(event).unwrap_or_else(|e| {
        warn!("Failed to serialize ws event: {}", e);
        "{}".to_string()
    });
    socket.send(Message::Text(msg)).await
}
