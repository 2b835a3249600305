//! Editor-instance websocket — the leader's side of one client connection.
//!
//! DESIGN
//! ======
//! The upgrade is refused with 401 unless the request carries
//! `Authorization: Bearer <installation token>`. Accepted clients are
//! registered for event broadcast and enter a `select!` loop:
//! - Incoming `query` frames → parse, forward to the board in a spawned
//!   task, reply `queryResult` through the client's queue
//! - Queued results and broadcast events → forward to the client
//! - Server shutdown → close the socket
//!
//! Queries run concurrently; the client correlates results by `requestId`.

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::send_json;
use crate::frame::{ClientMessage, ClientRequest, ErrorCode, Reply};
use crate::query::Query;
use crate::services;
use crate::services::query::QueryError;
use crate::state::AppState;

/// Outbound queue depth per editor instance.
const CLIENT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// UPGRADE
// =============================================================================

/// Auth is checked before the upgrade request itself is validated, so an
/// unauthenticated caller always sees 401.
pub async fn handle_client_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !is_authorized(&headers, &state.auth_token) {
        warn!("client: rejected unauthorized connection");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| run_client_ws(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

fn is_authorized(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| presented.trim() == token)
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_client_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<ClientMessage>(CLIENT_QUEUE_CAPACITY);
    let mut shutdown = state.shutdown_signal();

    state.clients.write().await.insert(client_id, client_tx.clone());
    info!(%client_id, "client: connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => dispatch_text(&state, client_id, &client_tx, &text),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(message) = client_rx.recv() => {
                if send_json(&mut socket, &message).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.clients.write().await.remove(&client_id);
    info!(%client_id, "client: disconnected");
}

// =============================================================================
// QUERY DISPATCH
// =============================================================================

fn dispatch_text(state: &AppState, client_id: Uuid, client_tx: &mpsc::Sender<ClientMessage>, text: &str) {
    let request = match serde_json::from_str::<ClientRequest>(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "client: invalid inbound frame");
            return;
        }
    };

    let ClientRequest::Query { board_id, name, request_id, data } = request;
    debug!(%client_id, %board_id, %name, %request_id, "client: query");

    let state = state.clone();
    let client_tx = client_tx.clone();
    tokio::spawn(async move {
        let result = match Query::parse(&name, data) {
            Ok(query) => services::query::dispatch(&state, &board_id, query).await,
            Err(e) => Err(QueryError::from(e)),
        };
        let response = match result {
            Ok(value) => Reply::success(value),
            Err(e) => {
                warn!(%client_id, %board_id, %name, code = e.error_code(), error = %e, "client: query failed");
                Reply::failure(&e)
            }
        };
        // The client may have gone away while the board was answering.
        let _ = client_tx.send(ClientMessage::QueryResult { request_id, response }).await;
    });
}

#[cfg(test)]
#[path = "client_ws_test.rs"]
mod tests;
