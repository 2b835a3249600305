//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It owns the card store, the live board links keyed by board id, the
//! connected editor instances, and the local event stream the leader's own
//! editor side consumes when it does not connect to itself.
//!
//! LOCKING
//! =======
//! The store sits behind a synchronous mutex that is never held across an
//! await. Links and clients use async `RwLock`s. When both are needed the
//! links lock is taken first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{RwLock, broadcast, mpsc, watch};
use uuid::Uuid;

use crate::frame::{BoardEvent, ClientMessage};
use crate::services::board::BoardLink;
use crate::store::CardStore;

/// Capacity of the in-process event stream.
const LOCAL_EVENT_CAPACITY: usize = 256;

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<CardStore>>,
    /// Active board link per board id. Last registration wins.
    pub links: Arc<RwLock<HashMap<String, BoardLink>>>,
    /// Connected editor instances: `client_id` -> sender for outgoing messages.
    pub clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<ClientMessage>>>>,
    /// Board events fired in-process, alongside the broadcast to clients.
    pub events: broadcast::Sender<BoardEvent>,
    /// Bearer token editor instances must present on `/client`.
    pub auth_token: Arc<str>,
    pub query_timeout: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    #[must_use]
    pub fn new(auth_token: &str, query_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(LOCAL_EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            store: Arc::new(Mutex::new(CardStore::new())),
            links: Arc::new(RwLock::new(HashMap::new())),
            clients: Arc::new(RwLock::new(HashMap::new())),
            events,
            auth_token: Arc::from(auth_token),
            query_timeout,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Lock the card store. Never hold the guard across an await.
    pub fn store(&self) -> MutexGuard<'_, CardStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live link for a board, if one is registered.
    pub async fn link_for(&self, board_id: &str) -> Option<BoardLink> {
        self.links.read().await.get(board_id).cloned()
    }

    /// Receiver that flips to `true` once the server starts shutting down.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
