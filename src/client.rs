//! RPC client — a non-leader instance's connection to the leader.
//!
//! DESIGN
//! ======
//! One websocket to `/client`, authenticated with the installation token.
//! A background task owns the socket: it drains the outbound queue, resolves
//! pending queries as `queryResult` frames arrive (matched by `requestId`
//! only, never by order), and republishes `event` frames to subscribers.
//!
//! The client never reconnects on its own. `wait_for_connect` opens a new
//! socket when the previous one is gone; the supervisor decides when.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::frame::{BoardEvent, ClientMessage, ClientRequest, ErrorCode, Reply};
use crate::pending::PendingRequests;
use crate::query::Query;
use crate::services::query::QueryError;

/// Extra wait beyond the leader's own board timeout, so the leader's
/// `E_TIMEOUT` reply normally arrives before the local deadline.
const QUERY_TIMEOUT_SLACK: Duration = Duration::from_secs(2);
/// Limit on the websocket handshake when no other is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const OUTBOUND_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("installation token is not a valid header value")]
    InvalidToken,
    #[error("unauthorized: the coordination service rejected this installation's token")]
    Unauthorized,
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("websocket handshake did not complete within {0:?}")]
    ConnectTimeout(Duration),
    #[error("not connected to a coordination service")]
    NotConnected,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("no result for {name} within {timeout:?}")]
    Timeout { name: &'static str, timeout: Duration },
    #[error("{code}: {reason}")]
    Query { code: String, reason: String },
}

impl ClientError {
    /// Grepable code for logs and for callers that branch on failures.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidUrl(_) | Self::InvalidToken => "E_INVALID_CONFIG",
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Connect(_) => "E_CONNECT",
            Self::NotConnected => "E_NOT_CONNECTED",
            Self::ConnectionClosed => "E_CHANNEL_CLOSED",
            Self::ConnectTimeout(_) | Self::Timeout { .. } => "E_TIMEOUT",
            Self::Query { code, .. } => code,
        }
    }
}

impl From<QueryError> for ClientError {
    fn from(e: QueryError) -> Self {
        Self::Query { code: e.error_code().to_owned(), reason: e.to_string() }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Cloneable handle; clones share one connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    ws_url: String,
    auth_token: String,
    query_timeout: Duration,
    connect_timeout: Duration,
    pending: PendingRequests<Reply>,
    events: broadcast::Sender<BoardEvent>,
    connection: Mutex<Option<Connection>>,
    /// Held across a handshake so concurrent connects open one socket.
    connecting: Mutex<()>,
}

struct Connection {
    outbound: mpsc::Sender<ClientRequest>,
    closed: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl Connection {
    fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    async fn close(self) {
        drop(self.outbound);
        let _ = self.task.await;
    }
}

impl RpcClient {
    /// Client for the leader at `server_url` (`http://host:port`). Does not
    /// connect yet.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidUrl`] when the url is not `http://` or `https://`.
    pub fn new(server_url: &str, auth_token: &str, query_timeout: Duration) -> Result<Self, ClientError> {
        Self::with_connect_timeout(server_url, auth_token, query_timeout, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Like [`RpcClient::new`], with an explicit limit on each handshake.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidUrl`] when the url is not `http://` or `https://`.
    pub fn with_connect_timeout(
        server_url: &str,
        auth_token: &str,
        query_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let ws_url = to_ws_url(server_url)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                ws_url,
                auth_token: auth_token.to_owned(),
                query_timeout: query_timeout + QUERY_TIMEOUT_SLACK,
                connect_timeout,
                pending: PendingRequests::new(),
                events,
                connection: Mutex::new(None),
                connecting: Mutex::new(()),
            }),
        })
    }

    /// Resolve once connected. Returns immediately while a connection is
    /// open; otherwise opens a new one. The handshake runs without holding
    /// the connection slot, so queries issued meanwhile fail with
    /// `NotConnected` instead of waiting.
    ///
    /// # Errors
    ///
    /// [`ClientError::Unauthorized`] when the leader rejects the token,
    /// [`ClientError::ConnectTimeout`] when the handshake stalls, and
    /// [`ClientError::Connect`] for any other connect failure.
    pub async fn wait_for_connect(&self) -> Result<(), ClientError> {
        let _connecting = self.inner.connecting.lock().await;
        if self.is_connected().await {
            return Ok(());
        }
        let connection = self.open().await?;
        *self.inner.connection.lock().await = Some(connection);
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.connection.lock().await.as_ref().is_some_and(Connection::is_open)
    }

    /// Board events pushed by the leader.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve when the current connection closes, or at once if there is none.
    pub async fn closed(&self) {
        let closed = self.inner.connection.lock().await.as_ref().map(|c| c.closed.clone());
        if let Some(mut closed) = closed {
            let _ = closed.wait_for(|is_closed| *is_closed).await;
        }
    }

    /// Close the connection. Pending queries fail with `ConnectionClosed`.
    pub async fn disconnect(&self) {
        let connection = self.inner.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await;
        }
    }

    /// Forward a query to a board through the leader.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] without an open connection,
    /// [`ClientError::Query`] when the leader reports a failure, and
    /// `ConnectionClosed` or `Timeout` when no result arrives.
    pub async fn query(&self, board_id: &str, query: &Query) -> Result<Value, ClientError> {
        let outbound = {
            let guard = self.inner.connection.lock().await;
            match guard.as_ref() {
                Some(c) if c.is_open() => c.outbound.clone(),
                _ => return Err(ClientError::NotConnected),
            }
        };

        let pending = &self.inner.pending;
        let (request_id, rx) = pending.register();
        let request = ClientRequest::Query {
            board_id: board_id.to_owned(),
            name: query.name().to_owned(),
            request_id: request_id.clone(),
            data: query.args(),
        };
        if outbound.send(request).await.is_err() {
            pending.cancel(&request_id);
            return Err(ClientError::ConnectionClosed);
        }
        drop(outbound);

        let timeout = self.inner.query_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply.into_result().map_err(|(code, reason)| ClientError::Query { code, reason }),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                pending.cancel(&request_id);
                Err(ClientError::Timeout { name: query.name(), timeout })
            }
        }
    }

    async fn open(&self) -> Result<Connection, ClientError> {
        let inner = &self.inner;
        let mut request = inner
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connect(Box::new(e)))?;
        let bearer =
            HeaderValue::from_str(&format!("Bearer {}", inner.auth_token)).map_err(|_| ClientError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let handshake = tokio::time::timeout(inner.connect_timeout, connect_async(request)).await;
        let Ok(handshake) = handshake else {
            warn!(url = %inner.ws_url, timeout_ms = u64::try_from(inner.connect_timeout.as_millis()).unwrap_or(u64::MAX), "client: handshake timed out");
            return Err(ClientError::ConnectTimeout(inner.connect_timeout));
        };
        let stream = match handshake {
            Ok((stream, _)) => stream,
            Err(tungstenite::Error::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
                warn!(url = %inner.ws_url, "client: unauthorized");
                return Err(ClientError::Unauthorized);
            }
            Err(e) => return Err(ClientError::Connect(Box::new(e))),
        };

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (closed_tx, closed) = watch::channel(false);
        let task = tokio::spawn(run_connection(
            stream,
            outbound_rx,
            closed_tx,
            inner.pending.clone(),
            inner.events.clone(),
        ));

        info!(url = %inner.ws_url, "client: connected");
        Ok(Connection { outbound, closed, task })
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

async fn run_connection(
    stream: WsStream,
    mut outbound: mpsc::Receiver<ClientRequest>,
    closed: watch::Sender<bool>,
    pending: PendingRequests<Reply>,
    events: broadcast::Sender<BoardEvent>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            msg = source.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => handle_text(&text, &pending, &events),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            request = outbound.recv() => {
                let Some(request) = request else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let json = match serde_json::to_string(&request) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(error = %e, "client: failed to serialize request");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let abandoned = pending.clear();
    closed.send_replace(true);
    info!(abandoned, "client: connection closed");
}

fn handle_text(text: &str, pending: &PendingRequests<Reply>, events: &broadcast::Sender<BoardEvent>) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::QueryResult { request_id, response }) => {
            if !pending.resolve(&request_id, response) {
                debug!(%request_id, "client: discarded unmatched query result");
            }
        }
        Ok(ClientMessage::Event { event }) => {
            // No subscribers is fine.
            let _ = events.send(event);
        }
        Err(e) => warn!(error = %e, "client: invalid inbound frame"),
    }
}

fn to_ws_url(server_url: &str) -> Result<String, ClientError> {
    let base = server_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        return Err(ClientError::InvalidUrl(server_url.to_owned()));
    };
    Ok(format!("{ws}/client"))
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
