//! Connection identity and the outbound half of a client transport.
//!
//! Every accepted socket gets a [`ConnectionId`] and a bounded outbound queue
//! drained by its writer task. Other parts of the relay only ever hold a
//! [`PeerHandle`], so delivering to a peer is a non-blocking enqueue.

use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Unique identifier of one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh, time-ordered connection identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// UTF-8 text frame, written exactly as given.
    Text(String),
    /// Binary frame, written exactly as given.
    Binary(Vec<u8>),
    /// Close the socket after everything queued before it was written.
    Close,
}

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The outbound queue is full; the frame was skipped.
    #[error("outbound buffer is full")]
    Saturated,
    /// The writer task is gone; the transport is closed or broken.
    #[error("transport is closed")]
    Closed,
}

/// Cloneable sending side of a connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl PeerHandle {
    /// Wraps the outbound queue of connection `id`.
    #[must_use]
    pub const fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self { id, tx }
    }

    /// The connection this handle writes to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Saturated`] when the queue is full and
    /// [`DeliveryError::Closed`] when the writer task has stopped.
    pub fn try_deliver(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Saturated,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
