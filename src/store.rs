//! Card store — authoritative in-memory boards and cards.
//!
//! DESIGN
//! ======
//! Pure data. The store never touches a socket: board connections are
//! tracked by connection id only, and the live channels behind those ids
//! belong to `AppState`. Every mutation that changes something emits one
//! typed [`StoreEvent`] to the registered observers, synchronously and in
//! registration order. Mutations that change nothing emit nothing.
//!
//! CONCURRENCY
//! ===========
//! Methods are synchronous and never block. The service owns the store
//! behind one mutex that is never held across an await; observers run
//! under that mutex and must not call back into the store.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::card::{Card, CardStatus};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub id: String,
    pub name: String,
    /// Cards keyed by [`Card::key`].
    pub cards: HashMap<String, Card>,
}

impl Board {
    fn new(id: &str, name: &str) -> Self {
        Self { id: id.to_owned(), name: name.to_owned(), cards: HashMap::new() }
    }
}

/// Change notification delivered to store observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    BoardUpdate { board_id: String },
    /// `card` is `None` when the card was removed.
    CardUpdate { board_id: String, card_id: String, card: Option<Card> },
    ConnectedBoards { board_ids: Vec<String> },
    WorkspaceBoards { board_ids: Vec<String> },
}

/// Addressing for [`CardStore::set_card`].
#[derive(Debug, Clone, Copy)]
pub enum CardTarget<'a> {
    Board(&'a str),
    Link(&'a str),
}

/// Counts the status bar renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreSummary {
    pub boards: usize,
    pub cards: usize,
    pub disconnected_cards: usize,
    pub connected_boards: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn Fn(&StoreEvent) + Send + Sync>;

// =============================================================================
// STORE
// =============================================================================

#[derive(Default)]
pub struct CardStore {
    boards: HashMap<String, Board>,
    /// Active connection per board. Last registration wins.
    connections: HashMap<String, Uuid>,
    workspace_boards: BTreeSet<String>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl CardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    pub fn subscribe(&mut self, observer: impl Fn(&StoreEvent) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    fn emit(&self, event: &StoreEvent) {
        for (_, observer) in &self.observers {
            observer(event);
        }
    }

    // -------------------------------------------------------------------------
    // Boards
    // -------------------------------------------------------------------------

    /// Create a board if absent. An existing board is returned unchanged,
    /// even when `name` differs.
    pub fn add_board(&mut self, id: &str, name: &str) -> Board {
        if let Some(board) = self.boards.get(id) {
            return board.clone();
        }
        let board = Board::new(id, name);
        self.boards.insert(id.to_owned(), board.clone());
        debug!(board_id = id, name, "store: board added");
        self.emit(&StoreEvent::BoardUpdate { board_id: id.to_owned() });
        board
    }

    pub fn set_board_name(&mut self, id: &str, name: &str) -> Option<Board> {
        let board = self.boards.get_mut(id)?;
        if board.name == name {
            return Some(board.clone());
        }
        board.name = name.to_owned();
        let board = board.clone();
        self.emit(&StoreEvent::BoardUpdate { board_id: id.to_owned() });
        Some(board)
    }

    #[must_use]
    pub fn get_board(&self, id: &str) -> Option<&Board> {
        self.boards.get(id)
    }

    /// Known board ids, sorted.
    #[must_use]
    pub fn list_boards(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.boards.keys().cloned().collect();
        ids.sort();
        ids
    }

    // -------------------------------------------------------------------------
    // Cards
    // -------------------------------------------------------------------------

    /// Replace a board's cards with the board's own view, emitting one
    /// `CardUpdate` per card that was added, changed, or removed.
    /// Returns the number of changes, or `None` for an unknown board.
    pub fn set_board_cards(&mut self, id: &str, cards: Vec<Card>) -> Option<usize> {
        let board = self.boards.get_mut(id)?;

        let mut next: HashMap<String, Card> = HashMap::with_capacity(cards.len());
        for mut card in cards {
            card.set_board_id(id);
            next.insert(card.key(), card);
        }

        let mut changes = Vec::new();
        for (key, card) in &next {
            if board.cards.get(key) != Some(card) {
                changes.push(StoreEvent::CardUpdate {
                    board_id: id.to_owned(),
                    card_id: key.clone(),
                    card: Some(card.clone()),
                });
            }
        }
        for key in board.cards.keys() {
            if !next.contains_key(key) {
                changes.push(StoreEvent::CardUpdate { board_id: id.to_owned(), card_id: key.clone(), card: None });
            }
        }

        board.cards = next;
        debug!(board_id = id, changes = changes.len(), "store: board cards replaced");
        for event in &changes {
            self.emit(event);
        }
        Some(changes.len())
    }

    /// Upsert one card. A link target resolves to the board already holding
    /// that link, falling back to the card's own board for a new link.
    /// Returns false when no known board owns the card.
    pub fn set_card(&mut self, target: CardTarget<'_>, mut card: Card) -> bool {
        let board_id = match target {
            CardTarget::Board(id) => id.to_owned(),
            CardTarget::Link(link) => self
                .board_for_link(link)
                .unwrap_or_else(|| card.board_id().to_owned()),
        };
        let Some(board) = self.boards.get_mut(&board_id) else {
            warn!(board_id = %board_id, title = card.title(), "store: set_card for unknown board");
            return false;
        };

        card.set_board_id(board_id.as_str());
        let key = card.key();
        if board.cards.get(&key) == Some(&card) {
            return true;
        }
        board.cards.insert(key.clone(), card.clone());
        self.emit(&StoreEvent::CardUpdate { board_id, card_id: key, card: Some(card) });
        true
    }

    #[must_use]
    pub fn get_card_by_link(&self, link: &str) -> Option<&Card> {
        self.boards.values().find_map(|b| b.cards.get(link))
    }

    pub fn delete_card_by_link(&mut self, link: &str) -> Option<Card> {
        let board_id = self.board_for_link(link)?;
        let removed = self.boards.get_mut(&board_id)?.cards.remove(link)?;
        self.emit(&StoreEvent::CardUpdate { board_id, card_id: link.to_owned(), card: None });
        Some(removed)
    }

    /// Update the status and code link of a stored card. Returns the updated
    /// card, or `None` when the link is unknown.
    pub fn set_card_status(&mut self, link: &str, status: CardStatus, code_link: Option<String>) -> Option<Card> {
        let mut card = self.get_card_by_link(link)?.clone();
        card.set_status(status);
        card.set_code_link(code_link);
        self.set_card(CardTarget::Link(link), card.clone());
        Some(card)
    }

    /// Every card of every board. The cards are copied when this is called,
    /// so later mutations do not affect the returned iterator.
    #[must_use]
    pub fn list_all_cards(&self) -> std::vec::IntoIter<Card> {
        self.boards
            .values()
            .flat_map(|b| b.cards.values().cloned())
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn board_for_link(&self, link: &str) -> Option<String> {
        self.boards
            .values()
            .find(|b| b.cards.contains_key(link))
            .map(|b| b.id.clone())
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Register `connection_id` as the active connection for a board and
    /// return the connection it superseded, if any.
    pub fn connect_board(&mut self, id: &str, connection_id: Uuid) -> Option<Uuid> {
        let previous = self.connections.insert(id.to_owned(), connection_id);
        if previous != Some(connection_id) {
            self.emit_connected_boards();
        }
        previous
    }

    /// Remove a board's connection, but only if `connection_id` is still the
    /// active one. A superseded connection closing late is a no-op.
    pub fn disconnect_board(&mut self, id: &str, connection_id: Uuid) -> bool {
        if self.connections.get(id) != Some(&connection_id) {
            return false;
        }
        self.connections.remove(id);
        self.emit_connected_boards();
        true
    }

    #[must_use]
    pub fn connection_for(&self, id: &str) -> Option<Uuid> {
        self.connections.get(id).copied()
    }

    /// Boards with an active connection, sorted.
    #[must_use]
    pub fn get_connected_boards(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn emit_connected_boards(&self) {
        self.emit(&StoreEvent::ConnectedBoards { board_ids: self.get_connected_boards() });
    }

    // -------------------------------------------------------------------------
    // Workspace boards
    // -------------------------------------------------------------------------

    pub fn set_workspace_boards(&mut self, ids: impl IntoIterator<Item = String>) {
        let next: BTreeSet<String> = ids.into_iter().collect();
        if next == self.workspace_boards {
            return;
        }
        self.workspace_boards = next;
        self.emit(&StoreEvent::WorkspaceBoards { board_ids: self.workspace_boards.iter().cloned().collect() });
    }

    /// Boards tracked by the workspace. An empty selection means every
    /// known board.
    #[must_use]
    pub fn list_workspace_boards(&self) -> Vec<String> {
        if self.workspace_boards.is_empty() {
            return self.list_boards();
        }
        self.workspace_boards
            .iter()
            .filter(|id| self.boards.contains_key(*id))
            .cloned()
            .collect()
    }

    // -------------------------------------------------------------------------
    // Summary
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        let workspace = self.list_workspace_boards();
        let cards = workspace
            .iter()
            .filter_map(|id| self.boards.get(id))
            .flat_map(|b| b.cards.values());

        let mut summary = StoreSummary {
            boards: workspace.len(),
            connected_boards: self.connections.len(),
            ..StoreSummary::default()
        };
        for card in cards {
            summary.cards += 1;
            if card.status() == CardStatus::Disconnected {
                summary.disconnected_cards += 1;
            }
        }
        summary
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
