//! Supervisor — keeps one editor instance attached to the coordination
//! service for the life of the process.
//!
//! STATE MACHINE
//! =============
//! - `server`: this instance leads. Its editor side either connects to its
//!   own transport like any other instance (workspace websockets on) or
//!   consumes the transport's in-process events (off).
//! - `client`: follow the leader. On disconnect or a failed connect, wait
//!   the next backoff delay and reconnect; while no service is healthy and
//!   failover is enabled, try to take over the port first.
//! - `disabled`: nothing usable. Only an explicit retry re-runs the launcher.
//!
//! An unauthorized rejection is never retried automatically.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{ClientError, RpcClient};
use crate::config::{Config, Flag};
use crate::frame::BoardEvent;
use crate::launcher::{LaunchOutcome, Launcher};
use crate::query::Query;
use crate::server::ServerHandle;
use crate::services;
use crate::state::AppState;

const EVENT_CAPACITY: usize = 256;

/// What this instance currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Starting,
    Server,
    Client { url: String },
    Reconnecting { attempt: u32 },
    Disabled { error: String },
    Stopped,
}

/// Where editor-side queries go right now.
#[derive(Clone)]
enum Route {
    Detached,
    Local(AppState),
    Remote(RpcClient),
}

struct Inner {
    launcher: Launcher,
    auth_token: String,
    mode: watch::Sender<Mode>,
    events: broadcast::Sender<BoardEvent>,
    route: RwLock<Route>,
    leader_state: RwLock<Option<AppState>>,
    retry: Notify,
    stop: watch::Sender<bool>,
}

pub struct Supervisor {
    inner: Arc<Inner>,
    task: JoinHandle<()>,
}

impl Supervisor {
    /// Run the launcher and keep the instance attached in the background.
    #[must_use]
    pub fn start(config: Config, auth_token: &str) -> Self {
        let (mode, _) = watch::channel(Mode::Starting);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (stop, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            launcher: Launcher::new(config, auth_token),
            auth_token: auth_token.to_owned(),
            mode,
            events,
            route: RwLock::new(Route::Detached),
            leader_state: RwLock::new(None),
            retry: Notify::new(),
            stop,
        });
        let task = tokio::spawn(run(inner.clone()));
        Self { inner, task }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.mode.borrow().clone()
    }

    #[must_use]
    pub fn watch_mode(&self) -> watch::Receiver<Mode> {
        self.inner.mode.subscribe()
    }

    /// Board events, whichever instance leads.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.inner.events.subscribe()
    }

    /// The leader's state while this instance leads.
    pub async fn server_state(&self) -> Option<AppState> {
        self.inner.leader_state.read().await.clone()
    }

    /// Re-run the launcher after a terminal `disabled`, or skip the current
    /// backoff wait while reconnecting.
    pub fn retry(&self) {
        self.inner.retry.notify_one();
    }

    /// Forward a query to a board through whichever instance leads.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] while detached, otherwise the failure
    /// reported by the leader or the connection.
    pub async fn query(&self, board_id: &str, query: Query) -> Result<Value, ClientError> {
        let route = self.inner.route.read().await.clone();
        match route {
            Route::Detached => Err(ClientError::NotConnected),
            Route::Local(state) => Ok(services::query::dispatch(&state, board_id, query).await?),
            Route::Remote(client) => client.query(board_id, &query).await,
        }
    }

    /// Stop supervising. A leading instance shuts its server down.
    pub async fn shutdown(self) {
        self.inner.stop.send_replace(true);
        self.inner.retry.notify_one();
        let _ = self.task.await;
    }
}

// =============================================================================
// RUN LOOP
// =============================================================================

async fn run(inner: Arc<Inner>) {
    let mut outcome = inner.launcher.initialize().await;
    loop {
        info!(mode = outcome.mode_name(), "supervisor: launch outcome");
        let next = match outcome {
            LaunchOutcome::Server(handle) => {
                inner.lead(handle).await;
                None
            }
            LaunchOutcome::Client { url } => inner.follow(url).await,
            LaunchOutcome::Disabled { error } => inner.idle(error).await,
        };
        match next {
            Some(next) => outcome = next,
            None => break,
        }
    }
    inner.set_route(Route::Detached).await;
    inner.mode.send_replace(Mode::Stopped);
    info!("supervisor: stopped");
}

impl Inner {
    fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    fn client_for(&self, url: &str) -> Result<RpcClient, ClientError> {
        let config = self.launcher.config();
        RpcClient::with_connect_timeout(url, &self.auth_token, config.query_timeout, config.connect_timeout)
    }

    async fn set_route(&self, route: Route) {
        *self.route.write().await = route;
    }

    /// Lead until stopped, then shut the server down.
    async fn lead(&self, handle: ServerHandle) {
        let state = handle.state().clone();
        let mut local_events = state.events.subscribe();
        *self.leader_state.write().await = Some(state.clone());
        self.mode.send_replace(Mode::Server);

        if self.launcher.config().flags.is_enabled(Flag::WorkspaceWebsockets) {
            drop(local_events);
            self.attach_to_self(&handle).await;
        } else {
            self.set_route(Route::Local(state.clone())).await;
            forward(&self.events, &mut local_events, std::future::pending(), until_stopped(self.stop.subscribe())).await;
        }

        self.set_route(Route::Detached).await;
        *self.leader_state.write().await = None;
        handle.shutdown().await;
    }

    /// The leader's editor side as a client of its own transport.
    async fn attach_to_self(&self, handle: &ServerHandle) {
        let client = match self.client_for(&handle.url()) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "supervisor: cannot build self client");
                until_stopped(self.stop.subscribe()).await;
                return;
            }
        };
        let mut retry = self.launcher.config().backoff.retry();
        let mut events = client.subscribe();

        while !self.is_stopping() {
            match client.wait_for_connect().await {
                Ok(()) => {
                    retry.reset();
                    self.set_route(Route::Remote(client.clone())).await;
                    let stopped = forward(&self.events, &mut events, client.closed(), until_stopped(self.stop.subscribe())).await;
                    self.set_route(Route::Detached).await;
                    if stopped {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "supervisor: self connect failed"),
            }
            if self.backoff_wait(retry.next_delay()).await {
                break;
            }
        }
        client.disconnect().await;
    }

    /// Follow the leader at `url`. Returns the next outcome when this
    /// instance must change role, or `None` when stopped.
    async fn follow(&self, url: String) -> Option<LaunchOutcome> {
        let client = match self.client_for(&url) {
            Ok(c) => c,
            Err(e) => return Some(LaunchOutcome::Disabled { error: e.to_string() }),
        };
        let mut retry = self.launcher.config().backoff.retry();
        // Subscribed before the first connect so frames arriving during the
        // handshake are not lost.
        let mut events = client.subscribe();

        loop {
            if self.is_stopping() {
                return None;
            }

            match client.wait_for_connect().await {
                Ok(()) => {
                    retry.reset();
                    self.set_route(Route::Remote(client.clone())).await;
                    self.mode.send_replace(Mode::Client { url: url.clone() });
                    info!(%url, "supervisor: following leader");

                    let stopped = forward(&self.events, &mut events, client.closed(), until_stopped(self.stop.subscribe())).await;
                    self.set_route(Route::Detached).await;
                    if stopped {
                        client.disconnect().await;
                        return None;
                    }
                    warn!(%url, "supervisor: lost connection to leader");
                }
                Err(ClientError::Unauthorized) => {
                    error!(%url, "supervisor: leader rejected this installation's token");
                    return Some(LaunchOutcome::Disabled { error: ClientError::Unauthorized.to_string() });
                }
                Err(e) => debug!(%url, error = %e, "supervisor: connect failed"),
            }

            if self.launcher.should_attempt_failover() && !self.launcher.discovery().check_server_health().await {
                match self.launcher.handle_server_failover().await {
                    Some(LaunchOutcome::Client { .. }) | None => {}
                    Some(outcome) => return Some(outcome),
                }
            }

            let delay = retry.next_delay();
            self.mode.send_replace(Mode::Reconnecting { attempt: retry.attempt() });
            debug!(%url, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "supervisor: reconnecting after delay");
            if self.backoff_wait(delay).await {
                return None;
            }
        }
    }

    /// Wait for an explicit retry, then re-run the launcher.
    async fn idle(&self, error: String) -> Option<LaunchOutcome> {
        self.set_route(Route::Detached).await;
        warn!(%error, "supervisor: disabled until retried");
        self.mode.send_replace(Mode::Disabled { error });

        tokio::select! {
            () = self.retry.notified() => {}
            () = until_stopped(self.stop.subscribe()) => return None,
        }
        if self.is_stopping() {
            return None;
        }
        info!("supervisor: retry requested");
        self.mode.send_replace(Mode::Starting);
        Some(self.launcher.initialize().await)
    }

    /// Sleep for `delay`, cut short by a retry trigger. True when stopped.
    async fn backoff_wait(&self, delay: std::time::Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.retry.notified() => {}
            () = until_stopped(self.stop.subscribe()) => return true,
        }
        self.is_stopping()
    }
}

/// Republish events until `closed` resolves or the supervisor stops.
/// Returns true when stopped.
async fn forward(
    out: &broadcast::Sender<BoardEvent>,
    events: &mut broadcast::Receiver<BoardEvent>,
    closed: impl Future<Output = ()>,
    stopped: impl Future<Output = ()>,
) -> bool {
    tokio::pin!(closed);
    tokio::pin!(stopped);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    // No subscribers is fine.
                    let _ = out.send(event);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "supervisor: event stream lagged"),
                Err(RecvError::Closed) => return false,
            },
            () = &mut closed => return false,
            () = &mut stopped => return true,
        }
    }
}

async fn until_stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopping| *stopping).await;
}

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod tests;
