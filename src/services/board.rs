//! Board service — board links, the connect handshake, and event fan-out.
//!
//! DESIGN
//! ======
//! A `BoardLink` is the leader's handle on one board socket: an outbound
//! queue drained by the socket loop plus the correlation table the loop
//! resolves as `queryResult` frames arrive. Querying a board never blocks
//! the socket loop, so the handshake runs as its own task while the loop
//! keeps relaying frames.
//!
//! LIFECYCLE
//! =========
//! 1. Socket opens → `connect_board` task starts
//! 2. `getBoardInfo` → add board or update its name
//! 3. Register the link (supersedes any previous link for the board)
//! 4. `cards` → `set_board_cards`
//! 5. Fire `connect{boardInfo}`
//! 6. Socket closes → `part_board` unregisters if still active and fires
//!    `disconnect{}`

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::card::{BoardIdentity, BoardInfo, Card};
use crate::frame::{BoardEvent, BoardMessage, BoardRequest, ClientMessage};
use crate::pending::PendingRequests;
use crate::query::Query;
use crate::services::query::QueryError;
use crate::state::AppState;
use crate::store::CardTarget;

// =============================================================================
// BOARD LINK
// =============================================================================

/// Leader-side handle on one live board socket.
#[derive(Clone)]
pub struct BoardLink {
    pub connection_id: Uuid,
    tx: mpsc::Sender<BoardRequest>,
    pending: PendingRequests<Value>,
}

impl BoardLink {
    #[must_use]
    pub fn new(connection_id: Uuid, tx: mpsc::Sender<BoardRequest>) -> Self {
        Self { connection_id, tx, pending: PendingRequests::new() }
    }

    /// Correlation table for results arriving on this link.
    #[must_use]
    pub fn pending(&self) -> &PendingRequests<Value> {
        &self.pending
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a query to the board and wait for its correlated result.
    ///
    /// # Errors
    ///
    /// [`QueryError::ChannelClosed`] if the socket is gone or closes while
    /// waiting, [`QueryError::Timeout`] if no result arrives in time.
    pub async fn query(&self, query: &Query, timeout: Duration) -> Result<Value, QueryError> {
        let (request_id, rx) = self.pending.register();
        let request = BoardRequest::Query {
            name: query.name().to_owned(),
            request_id: request_id.clone(),
            data: query.args(),
        };

        if self.tx.send(request).await.is_err() {
            self.pending.cancel(&request_id);
            return Err(QueryError::ChannelClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(QueryError::ChannelClosed),
            Err(_) => {
                self.pending.cancel(&request_id);
                Err(QueryError::Timeout { name: query.name(), timeout })
            }
        }
    }
}

// =============================================================================
// CONNECT / PART
// =============================================================================

/// Run the connect handshake for a freshly opened board socket.
/// Returns the board id once the board is registered and synced.
///
/// # Errors
///
/// Any query error from the board, or [`QueryError::InvalidResponse`] when
/// the board answers with an unexpected shape.
pub async fn connect_board(state: &AppState, link: BoardLink) -> Result<String, QueryError> {
    let info = link.query(&Query::GetBoardInfo, state.query_timeout).await?;
    let identity: BoardIdentity =
        serde_json::from_value(info).map_err(|e| QueryError::InvalidResponse { name: "getBoardInfo", message: e.to_string() })?;
    let board_id = identity.board_id.clone();

    let board = {
        let mut store = state.store();
        let board = store.add_board(&board_id, &identity.name);
        if board.name == identity.name {
            board
        } else {
            store.set_board_name(&board_id, &identity.name).unwrap_or(board)
        }
    };

    register_link(state, &board_id, link.clone()).await?;

    let cards = link.query(&Query::Cards, state.query_timeout).await?;
    let cards: Vec<Card> =
        serde_json::from_value(cards).map_err(|e| QueryError::InvalidResponse { name: "cards", message: e.to_string() })?;
    let count = cards.len();
    state.store().set_board_cards(&board_id, cards);

    info!(%board_id, name = %board.name, cards = count, connection_id = %link.connection_id, "board: connected");
    broadcast(state, BoardEvent::Connect { board_info: BoardInfo { id: board.id, name: board.name } }).await;
    Ok(board_id)
}

async fn register_link(state: &AppState, board_id: &str, link: BoardLink) -> Result<(), QueryError> {
    let mut links = state.links.write().await;
    // The socket loop drops its receiver before parting; a closed link here
    // means the board is already gone and must not be registered.
    if link.is_closed() {
        return Err(QueryError::ChannelClosed);
    }
    let connection_id = link.connection_id;
    links.insert(board_id.to_owned(), link);
    if let Some(previous) = state.store().connect_board(board_id, connection_id) {
        if previous != connection_id {
            info!(%board_id, %previous, %connection_id, "board: connection superseded");
        }
    }
    Ok(())
}

/// Unregister a closed board socket. Only the active link for its board is
/// removed; a superseded link closes silently.
pub async fn part_board(state: &AppState, connection_id: Uuid) {
    let board_id = {
        let mut links = state.links.write().await;
        let Some(board_id) = links
            .iter()
            .find(|(_, link)| link.connection_id == connection_id)
            .map(|(id, _)| id.clone())
        else {
            debug!(%connection_id, "board: closed before registration or after supersession");
            return;
        };
        links.remove(&board_id);
        board_id
    };

    let removed = state.store().disconnect_board(&board_id, connection_id);
    if removed {
        info!(%board_id, %connection_id, "board: disconnected");
        broadcast(state, BoardEvent::Disconnect {}).await;
    }
}

// =============================================================================
// INBOUND BOARD MESSAGES
// =============================================================================

/// Apply one message received on a board socket.
pub async fn handle_board_message(state: &AppState, link: &BoardLink, message: BoardMessage) {
    match message {
        BoardMessage::QueryResult { request_id, response } => {
            if !link.pending.resolve(&request_id, response) {
                debug!(%request_id, "board: discarded unmatched query result");
            }
        }
        BoardMessage::NavigateTo { card } => {
            broadcast(state, BoardEvent::NavigateToCard { card }).await;
        }
        BoardMessage::Card { url, card } => {
            {
                let mut store = state.store();
                match &card {
                    Some(card) => {
                        if !store.set_card(CardTarget::Link(&url), card.clone()) {
                            warn!(miro_link = %url, "board: card event for unknown board");
                        }
                    }
                    None => {
                        store.delete_card_by_link(&url);
                    }
                }
            }
            broadcast(state, BoardEvent::UpdateCard { miro_link: Some(url), card }).await;
        }
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Fire an event locally and push it to every connected editor instance.
pub async fn broadcast(state: &AppState, event: BoardEvent) {
    // No local receivers is fine.
    let _ = state.events.send(event.clone());

    let clients = state.clients.read().await;
    for (client_id, tx) in clients.iter() {
        // Best-effort: if a client's channel is full, skip it.
        if tx.try_send(ClientMessage::Event { event: event.clone() }).is_err() {
            warn!(%client_id, "board: dropped event for slow client");
        }
    }
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
