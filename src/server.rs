//! Server — binds the fixed port and runs the coordination service.
//!
//! Binding is the only cross-process mutual exclusion: whoever holds the
//! port is the leader. A [`ServerHandle`] owns the running service;
//! shutting it down closes every board and client socket and releases the
//! port, which peers observe exactly as if the process had exited.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::routes;
use crate::services;
use crate::state::AppState;

/// How long shutdown waits for open connections before forcing them closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
}

impl ServerError {
    /// True when another process already holds the port.
    #[must_use]
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            Self::Bind { source, .. } => source.kind() == std::io::ErrorKind::AddrInUse,
        }
    }
}

/// Live coordination service.
pub struct ServerHandle {
    state: AppState,
    local_addr: SocketAddr,
    serve: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle").field("local_addr", &self.local_addr).finish_non_exhaustive()
    }
}

/// Bind the configured address and start serving.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] when the port cannot be bound, most often
/// because another instance already leads.
pub async fn bind(config: &Config, auth_token: &str) -> Result<ServerHandle, ServerError> {
    let addr = config.bind_addr();
    let bind_err = |source| ServerError::Bind { addr: addr.clone(), source };
    let listener = TcpListener::bind(&addr).await.map_err(bind_err)?;
    let local_addr = listener.local_addr().map_err(bind_err)?;

    let state = AppState::new(auth_token, config.query_timeout);
    let app = routes::app(state.clone(), config.public_dir.as_deref());

    let mut signal = state.shutdown_signal();
    let serve = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = signal.wait_for(|stopping| *stopping).await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "server: serve failed");
        }
    });
    let sweep = services::sweep::spawn_pending_sweep(state.clone());

    info!(%local_addr, "server: listening");
    Ok(ServerHandle { state, local_addr, serve, sweep })
}

impl ServerHandle {
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// True once the serve task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.serve.is_finished()
    }

    /// Stop accepting, close every socket, and release the port.
    pub async fn shutdown(self) {
        let Self { state, local_addr, mut serve, sweep } = self;
        state.begin_shutdown();

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut serve).await.is_err() {
            warn!(%local_addr, "server: graceful shutdown timed out, aborting");
            serve.abort();
            let _ = serve.await;
        }
        let _ = sweep.await;
        info!(%local_addr, "server: stopped");
    }
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
