//! Relay server core: shared state, HTTP routes, and the per-connection
//! WebSocket task.
//!
//! Each accepted socket is split into a reader, which drives the connection's
//! [`Session`], and a writer task draining the connection's bounded outbound
//! queue. Peers only ever enqueue into that queue, so one slow or dead
//! socket never blocks another connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::dispatch::{Departure, Dispatcher};
use crate::peer::{ConnectionId, Outbound, PeerHandle};
use crate::rooms::RoomRegistry;
use crate::session::{Control, Session};
use crate::sweeper;

/// How long a closing connection may take to flush its queued frames.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Errors starting the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Other socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared relay server state.
pub struct RelayState {
    /// Room directory shared by every connection.
    pub registry: Arc<RoomRegistry>,
    dispatcher: Dispatcher,
    connections: AtomicUsize,
    max_message_size: usize,
    outbound_buffer: usize,
    relay_binary: bool,
    room_ttl: Duration,
    sweep_interval: Duration,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates relay state with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&RelayConfig::default())
    }

    /// Creates relay state from a resolved configuration.
    #[must_use]
    pub fn with_config(config: &RelayConfig) -> Self {
        let registry = Arc::new(RoomRegistry::with_limits(
            config.max_rooms,
            config.require_existing_room,
        ));
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            connections: AtomicUsize::new(0),
            max_message_size: config.max_message_size,
            outbound_buffer: config.outbound_buffer,
            relay_binary: config.relay_binary,
            room_ttl: config.room_ttl(),
            sweep_interval: config.sweep_interval(),
        }
    }

    /// Number of open WebSocket connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Counts one open connection for as long as it lives.
struct ConnectionSlot(Arc<RelayState>);

impl ConnectionSlot {
    fn open(state: &Arc<RelayState>) -> Self {
        state.connections.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(state))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

impl From<Outbound> for Message {
    fn from(frame: Outbound) -> Self {
        match frame {
            Outbound::Text(text) => Self::Text(text.into()),
            Outbound::Binary(data) => Self::Binary(data.into()),
            Outbound::Close => Self::Close(None),
        }
    }
}

/// Body of `GET /create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoom {
    /// Identifier of the newly allocated room.
    pub id: String,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Live rooms.
    pub rooms: usize,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Room slots in use.
    pub occupied_slots: usize,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

/// Drives one upgraded WebSocket until it closes.
///
/// The connection lifecycle:
/// 1. Allocate a connection id and outbound queue, start the writer task.
/// 2. Feed every inbound frame to the [`Session`].
/// 3. Stop on close, transport error, writer failure or an explicit leave.
/// 4. Close the session (room cleanup + peer notification) exactly once.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.outbound_buffer);
    let handle = PeerHandle::new(ConnectionId::new(), tx);
    let conn_id = handle.id();
    let mut session = Session::new(handle, state.dispatcher.clone(), state.relay_binary);

    let slot = ConnectionSlot::open(&state);
    tracing::info!(conn_id = %conn_id, "connection opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = frame == Outbound::Close;
            if ws_sender.send(frame.into()).await.is_err() {
                tracing::warn!(conn_id = %conn_id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                let control = match frame {
                    Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()),
                    Some(Ok(Message::Binary(data))) => session.handle_binary(data.to_vec()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => Control::Continue,
                    Some(Err(e)) => {
                        tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket read failed");
                        break;
                    }
                };
                if control == Control::Close {
                    break;
                }
            }
            _ = &mut write_task => {
                writer_done = true;
                break;
            }
        }
    }

    session.close(Departure::Disconnected);
    drop(session);

    if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut write_task).await.is_err() {
        write_task.abort();
    }

    drop(slot);
    tracing::info!(conn_id = %conn_id, "connection closed");
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    let limit = state.max_message_size;
    ws.max_message_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// `GET /create`: allocate an empty room for a share link.
async fn create_handler(State(state): State<Arc<RelayState>>) -> Response {
    match state.registry.create_room() {
        Ok(id) => {
            tracing::info!(room_id = %id, "room created over http");
            Json(CreatedRoom { id }).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "room creation over http failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// `GET /status`: registry and connection counters.
async fn status_handler(State(state): State<Arc<RelayState>>) -> Json<StatusReport> {
    Json(StatusReport {
        rooms: state.registry.room_count(),
        connections: state.connection_count(),
        occupied_slots: state.registry.occupied_slots(),
    })
}

async fn health_handler() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Builds the relay's HTTP router.
pub fn router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/", axum::routing::get(ws_handler))
        .route("/ws", axum::routing::get(ws_handler))
        .route("/create", axum::routing::get(create_handler))
        .route("/status", axum::routing::get(status_handler))
        .route("/health", axum::routing::get(health_handler))
        .with_state(state)
}

/// Aborts the wrapped task when the server future is dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Starts the relay server with default settings and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(addr: &str) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// The room sweeper runs for as long as the returned server task does.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let bound_addr = listener.local_addr()?;

    let sweeper = AbortOnDrop(sweeper::spawn(
        Arc::clone(&state.registry),
        state.sweep_interval,
        state.room_ttl,
    ));
    let app = router(state);

    let handle = tokio::spawn(async move {
        let _sweeper = sweeper;
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address
/// and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (SocketAddr, JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}
