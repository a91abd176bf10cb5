//! Per-connection signaling state machine.
//!
//! ```text
//! Connected --join/create--> Joining --ok--> InRoom
//!                               |--full/error--> Connected
//! InRoom --negotiation frame--> InRoom (forwarded to the peer)
//! any --leave / transport close / drop--> Closed
//! ```
//!
//! Close is a single terminal transition. Whichever path reaches it first
//! runs the room cleanup; later attempts find the session already `Closed`.

use pairlink_proto::signal::{self, ClientMessage};
use pairlink_proto::{ErrorCode, ServerMessage};

use crate::dispatch::{Departure, Dispatcher};
use crate::peer::{ConnectionId, Outbound, PeerHandle};
use crate::rooms::{RegistryError, Role};

/// Lifecycle state of one client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, not in any room.
    Connected,
    /// A join for `room_id` is being processed.
    Joining {
        /// Requested room.
        room_id: String,
    },
    /// Member of `room_id`.
    InRoom {
        /// Occupied room.
        room_id: String,
    },
    /// Terminal.
    Closed,
}

/// Whether the socket task should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep processing frames.
    Continue,
    /// The session is closed; flush and shut the socket.
    Close,
}

/// Signaling session bound to one transport.
pub struct Session {
    handle: PeerHandle,
    dispatcher: Dispatcher,
    relay_binary: bool,
    state: SessionState,
}

impl Session {
    /// Creates a session in the `Connected` state.
    ///
    /// `handle` is this connection's own outbound queue; replies go there
    /// and the registry hands it to the peer for forwarding.
    #[must_use]
    pub fn new(handle: PeerHandle, dispatcher: Dispatcher, relay_binary: bool) -> Self {
        Self {
            handle,
            dispatcher,
            relay_binary,
            state: SessionState::Connected,
        }
    }

    /// This connection's identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Room the connection currently occupies.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::InRoom { room_id } => Some(room_id),
            _ => None,
        }
    }

    /// Processes one inbound text frame.
    pub fn handle_text(&mut self, text: &str) -> Control {
        if self.state == SessionState::Closed {
            return Control::Close;
        }

        let msg = match signal::decode(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(conn_id = %self.id(), error = %e, "dropping malformed frame");
                self.reply(&ServerMessage::error(
                    ErrorCode::MalformedMessage,
                    e.to_string(),
                ));
                return Control::Continue;
            }
        };

        match msg {
            ClientMessage::Create => self.create(),
            ClientMessage::Join { room_id } => self.join(room_id),
            ClientMessage::Leave => {
                self.close(Departure::Left);
                return Control::Close;
            }
            ClientMessage::Log { message } => {
                tracing::info!(
                    conn_id = %self.id(),
                    room_id = self.room_id().unwrap_or("-"),
                    message = %message,
                    "client log"
                );
            }
            relayable => {
                tracing::debug!(conn_id = %self.id(), kind = relayable.kind(), "relaying frame");
                self.forward(Outbound::Text(text.to_owned()));
            }
        }
        Control::Continue
    }

    /// Processes one inbound binary frame.
    pub fn handle_binary(&mut self, data: Vec<u8>) -> Control {
        if self.state == SessionState::Closed {
            return Control::Close;
        }
        if self.relay_binary {
            self.forward(Outbound::Binary(data));
        } else {
            tracing::debug!(conn_id = %self.id(), len = data.len(), "binary relay disabled, frame dropped");
        }
        Control::Continue
    }

    /// Moves to `Closed`, leaving the current room if there is one.
    ///
    /// An explicit leave also queues a close frame for this connection.
    /// Calling this on a closed session does nothing.
    pub fn close(&mut self, how: Departure) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        match previous {
            SessionState::Closed => return,
            SessionState::InRoom { room_id } | SessionState::Joining { room_id } => {
                self.dispatcher.depart(&room_id, self.id(), how);
            }
            SessionState::Connected => {}
        }
        tracing::info!(conn_id = %self.id(), departure = ?how, "session closed");
        if how == Departure::Left
            && let Err(e) = self.handle.try_deliver(Outbound::Close)
        {
            tracing::debug!(conn_id = %self.id(), error = %e, "close frame not queued");
        }
    }

    /// The room this session still occupies.
    ///
    /// A room removed by the sweeper drops its members without telling them,
    /// so a stale `InRoom` state falls back to `Connected` here.
    fn live_room(&mut self) -> Option<String> {
        let room_id = self.room_id()?.to_owned();
        if self.dispatcher.registry().is_member(&room_id, self.id()) {
            return Some(room_id);
        }
        tracing::debug!(conn_id = %self.id(), room_id = %room_id, "room was evicted, session reset");
        self.state = SessionState::Connected;
        None
    }

    fn create(&mut self) {
        if let Some(room_id) = self.live_room() {
            let message = format!("already in room {room_id}");
            self.reply(&ServerMessage::error(ErrorCode::AlreadyInRoom, message));
            return;
        }
        match self.dispatcher.registry().create_room() {
            Ok(room_id) => {
                tracing::info!(conn_id = %self.id(), room_id = %room_id, "room created");
                self.join(room_id);
            }
            Err(e) => self.reject(&e),
        }
    }

    fn join(&mut self, room_id: String) {
        if let Some(current) = self.live_room() {
            let message = format!("already in room {current}");
            self.reply(&ServerMessage::error(ErrorCode::AlreadyInRoom, message));
            return;
        }

        self.state = SessionState::Joining {
            room_id: room_id.clone(),
        };
        let outcome = self
            .dispatcher
            .registry()
            .join(&room_id, self.handle.clone());

        match outcome {
            Ok(outcome) => {
                tracing::info!(
                    conn_id = %self.id(),
                    room_id = %room_id,
                    role = ?outcome.role,
                    count = outcome.peer_count,
                    "joined room"
                );
                self.state = SessionState::InRoom {
                    room_id: room_id.clone(),
                };
                match outcome.role {
                    Role::First => self.reply(&ServerMessage::Created {
                        room_id: room_id.clone(),
                    }),
                    Role::Second => self.reply(&ServerMessage::Joined {
                        room_id: room_id.clone(),
                        count: outcome.peer_count,
                    }),
                }
                if let Some(peer) = outcome.peer {
                    let notice = ServerMessage::PeerJoined {
                        room_id: room_id.clone(),
                        count: outcome.peer_count,
                    };
                    self.dispatcher.notify(&room_id, &peer, &notice);
                }
            }
            Err(RegistryError::RoomFull) => {
                tracing::info!(conn_id = %self.id(), room_id = %room_id, "room full, join rejected");
                self.state = SessionState::Connected;
                self.reply(&ServerMessage::Full { room_id });
            }
            Err(e) => {
                tracing::info!(conn_id = %self.id(), room_id = %room_id, error = %e, "join rejected");
                self.state = SessionState::Connected;
                self.reject(&e);
            }
        }
    }

    fn forward(&self, frame: Outbound) {
        match self.room_id() {
            Some(room_id) => {
                self.dispatcher.relay(room_id, self.id(), frame);
            }
            None => {
                tracing::debug!(conn_id = %self.id(), "not in a room, frame dropped");
            }
        }
    }

    fn reject(&self, err: &RegistryError) {
        self.reply(&ServerMessage::error(err.code(), err.to_string()));
    }

    fn reply(&self, msg: &ServerMessage) {
        match signal::encode(msg) {
            Ok(text) => {
                if let Err(e) = self.handle.try_deliver(Outbound::Text(text)) {
                    tracing::debug!(conn_id = %self.id(), error = %e, "reply not queued");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode reply"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close(Departure::Disconnected);
    }
}
