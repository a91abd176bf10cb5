//! Relay dispatcher: forwards frames to the other member of a room and runs
//! the departure path shared by explicit leaves, closed transports and failed
//! deliveries.

use std::sync::Arc;

use pairlink_proto::ServerMessage;
use pairlink_proto::signal;

use crate::peer::{ConnectionId, DeliveryError, Outbound, PeerHandle};
use crate::rooms::RoomRegistry;

/// How a member left its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The member sent `leave`.
    Left,
    /// The member's transport closed, errored or stopped accepting writes.
    Disconnected,
}

/// What happened to a relayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Queued on the peer's transport.
    Forwarded,
    /// No peer in the room (or the sender is not a member); dropped.
    NoPeer,
    /// The peer's outbound buffer was full; dropped.
    Skipped,
    /// The peer's transport was closed; the peer was removed from the room.
    PeerGone,
}

/// Routes frames between the two members of a room.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RoomRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher routes through.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Forwards `frame` unmodified from `from` to its peer in `room_id`.
    pub fn relay(&self, room_id: &str, from: ConnectionId, frame: Outbound) -> RelayOutcome {
        let Some(peer) = self.registry.peer_of(room_id, from) else {
            tracing::debug!(conn_id = %from, room_id = %room_id, "no peer, frame dropped");
            return RelayOutcome::NoPeer;
        };

        match peer.try_deliver(frame) {
            Ok(()) => {
                tracing::debug!(from = %from, to = %peer.id(), room_id = %room_id, "frame forwarded");
                RelayOutcome::Forwarded
            }
            Err(DeliveryError::Saturated) => {
                tracing::warn!(
                    from = %from,
                    to = %peer.id(),
                    room_id = %room_id,
                    "peer outbound buffer full, frame skipped"
                );
                RelayOutcome::Skipped
            }
            Err(DeliveryError::Closed) => {
                tracing::warn!(
                    to = %peer.id(),
                    room_id = %room_id,
                    "peer transport closed, removing peer"
                );
                self.depart(room_id, peer.id(), Departure::Disconnected);
                RelayOutcome::PeerGone
            }
        }
    }

    /// Sends a status notification to `to`.
    ///
    /// A closed transport is treated as that member disconnecting from
    /// `room_id`. Returns `true` if the notification was queued.
    pub fn notify(&self, room_id: &str, to: &PeerHandle, msg: &ServerMessage) -> bool {
        let text = match signal::encode(msg) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode notification");
                return false;
            }
        };
        match to.try_deliver(Outbound::Text(text)) {
            Ok(()) => true,
            Err(DeliveryError::Saturated) => {
                tracing::warn!(to = %to.id(), room_id = %room_id, "notification skipped, buffer full");
                false
            }
            Err(DeliveryError::Closed) => {
                self.depart(room_id, to.id(), Departure::Disconnected);
                false
            }
        }
    }

    /// Removes `leaving` from `room_id` and tells the remaining member.
    ///
    /// Returns `false` if `leaving` was not a member, in which case nobody is
    /// notified. This makes every departure path safe to run more than once.
    pub fn depart(&self, room_id: &str, leaving: ConnectionId, how: Departure) -> bool {
        let Some(outcome) = self.registry.leave(room_id, leaving) else {
            return false;
        };
        tracing::info!(
            conn_id = %leaving,
            room_id = %room_id,
            departure = ?how,
            room_deleted = outcome.room_deleted,
            "member left room"
        );

        if let Some(remaining) = outcome.remaining {
            let notice = match how {
                Departure::Left => ServerMessage::PeerLeft {
                    room_id: room_id.to_string(),
                },
                Departure::Disconnected => ServerMessage::PeerDisconnected {
                    room_id: room_id.to_string(),
                },
            };
            self.notify(room_id, &remaining, &notice);
        }
        true
    }
}
