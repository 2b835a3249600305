//! Board websocket — the leader's side of one board connection.
//!
//! DESIGN
//! ======
//! On upgrade the connect handshake starts as its own task and the socket
//! enters a `select!` loop:
//! - Incoming board frames → query results resolve pending entries, board
//!   events update the store and fan out
//! - Outbound queries queued on the link → forward to the board
//! - Server shutdown → close the socket
//!
//! On close the outbound queue is dropped first so a handshake still in
//! flight can no longer register the link, then the link is parted.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::send_json;
use crate::frame::{BoardMessage, BoardRequest};
use crate::services;
use crate::services::board::BoardLink;
use crate::state::AppState;

/// Outbound query queue depth per board.
const BOARD_QUEUE_CAPACITY: usize = 256;

pub async fn handle_board_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_board_ws(socket, state))
}

async fn run_board_ws(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (board_tx, mut board_rx) = mpsc::channel::<BoardRequest>(BOARD_QUEUE_CAPACITY);
    let link = BoardLink::new(connection_id, board_tx);
    let mut shutdown = state.shutdown_signal();

    info!(%connection_id, "board: socket opened");

    let handshake = tokio::spawn({
        let state = state.clone();
        let link = link.clone();
        async move {
            if let Err(e) = services::board::connect_board(&state, link).await {
                warn!(%connection_id, error = %e, "board: handshake failed");
            }
        }
    });

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => dispatch_text(&state, &link, connection_id, &text).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(request) = board_rx.recv() => {
                if send_json(&mut socket, &request).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    drop(board_rx);
    let abandoned = link.pending().clear();
    handshake.abort();
    services::board::part_board(&state, connection_id).await;
    info!(%connection_id, abandoned, "board: socket closed");
}

async fn dispatch_text(state: &AppState, link: &BoardLink, connection_id: Uuid, text: &str) {
    match serde_json::from_str::<BoardMessage>(text) {
        Ok(message) => services::board::handle_board_message(state, link, message).await,
        Err(e) => warn!(%connection_id, error = %e, "board: invalid inbound frame"),
    }
}
