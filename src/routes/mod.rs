//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One listener serves the versioned health handshake, the board websocket,
//! and the authenticated editor-instance websocket. When a public directory
//! is configured, the board-side app is served as static files at `/`.

pub mod board_ws;
pub mod client_ws;

use std::path::Path;

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::routing::get;
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::discovery::Health;
use crate::state::AppState;

/// Build the service router.
pub fn app(state: AppState, public_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/board", get(board_ws::handle_board_ws))
        .route("/client", get(client_ws::handle_client_ws))
        .with_state(state);

    let router = match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => router,
    };

    router
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<Health> {
    Json(Health::current())
}

/// Serialize and send one JSON text frame.
async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = match serde_json::to_string(value) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
