//! WebSocket upgrade handler and per-connection pump.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use billhub_core::error::AppError;
use billhub_core::types::id::{ConnectionId, UserId};
use billhub_realtime::RealtimeEngine;
use billhub_realtime::connection::registry::Registration;
use billhub_realtime::gateway::state::ConnectionState;
use billhub_realtime::message::types::OutboundEvent;

use crate::error::ApiError;
use crate::state::AppState;

/// Transport frame cap, as a multiple of the application frame limit.
///
/// Frames between the two limits reach the dispatcher and get a validation
/// `error` event while the connection stays open.
const TRANSPORT_HEADROOM: usize = 16;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// JWT access token.
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /ws?token={jwt}: authenticate, then upgrade.
///
/// The token may also be sent as `Authorization: Bearer <jwt>`. A missing or
/// invalid token is refused with 401 before any upgrade happens.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let conn_state = advance(ConnectionState::Connecting, ConnectionState::Authenticating);

    let token = query.token.or_else(|| bearer_token(&headers));
    let user_id = match state.realtime.authenticate(token.as_deref()).await {
        Ok(user_id) => user_id,
        Err(e) => {
            advance(conn_state, ConnectionState::Closed);
            info!(reason = %e.message, "WebSocket handshake refused");
            return Err(e.into());
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let engine = state.realtime.clone();
    let max_frame = state.config.realtime.max_message_size_bytes;
    Ok(ws
        .max_message_size(max_frame.saturating_mul(TRANSPORT_HEADROOM))
        .on_upgrade(move |socket| run_connection(engine, user_id, socket)))
}

/// Extracts the token from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

fn advance(current: ConnectionState, next: ConnectionState) -> ConnectionState {
    match current.transition(next) {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "Forcing connection closed");
            ConnectionState::Closed
        }
    }
}

/// Pumps one established connection until either side closes it.
async fn run_connection(
    engine: std::sync::Arc<RealtimeEngine>,
    user_id: UserId,
    socket: WebSocket,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Registration {
        registered,
        mut outbound,
    } = engine.connect(user_id);
    let handle = registered.handle;
    let conn_id = handle.id;
    let mut conn_state = advance(ConnectionState::Authenticating, ConnectionState::Established);

    info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connection established");

    // Outbound forwarder
    let writer_closed = handle.closed();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(conn_id = %conn_id, event = event.name(), error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = writer_closed.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Inbound loop
    let closed = handle.closed();
    while conn_state.accepts_events() {
        tokio::select! {
            _ = closed.cancelled() => {
                debug!(conn_id = %conn_id, "Connection closed by server");
                conn_state = advance(conn_state, ConnectionState::Closed);
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    engine.handle_text(conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    let err = AppError::validation("Binary frames are not supported");
                    reject(&engine, conn_id, err);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => handle.touch(),
                Some(Ok(Message::Close(_))) | None => {
                    conn_state = advance(conn_state, ConnectionState::Closed);
                }
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "WebSocket transport error");
                    let err = AppError::validation(format!("Frame rejected: {e}"));
                    reject(&engine, conn_id, err);
                    conn_state = advance(conn_state, ConnectionState::Closed);
                }
            }
        }
    }

    engine.disconnect(conn_id);
    let _ = writer.await;

    info!(
        conn_id = %conn_id,
        user_id = %user_id,
        state = conn_state.as_str(),
        "WebSocket connection closed"
    );
}

/// Reports a frame-level error to the connection that sent it.
fn reject(engine: &RealtimeEngine, conn_id: ConnectionId, err: AppError) {
    engine.metrics.error_sent();
    engine
        .registry
        .send_to_connection(conn_id, OutboundEvent::error(&err, None));
}
