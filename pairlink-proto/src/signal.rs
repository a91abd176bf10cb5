//! Signaling envelope carried in WebSocket text frames.
//!
//! Inbound frames are decoded once into a [`ClientMessage`]. The relay only
//! looks at the `type` tag of negotiation kinds; their bodies stay opaque and
//! the original frame text is what gets forwarded to the peer.

use serde::{Deserialize, Serialize};

/// Error type for envelope encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The inbound frame is not a recognised envelope.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// A server notification could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Messages a browser client sends to the relay.
///
/// Aliases cover the field and kind spellings used by the different client
/// builds (`session` vs `room`, `candidate` vs `ice-candidate`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Allocate a fresh room and become its first member.
    #[serde(alias = "create-session")]
    Create,

    /// Join (or implicitly create) the named room.
    #[serde(alias = "join-session")]
    Join {
        /// Room to join.
        #[serde(alias = "room", alias = "session", alias = "sessionId")]
        room_id: String,
    },

    /// Leave the current room and end the session.
    Leave,

    /// Client-side diagnostic line, logged by the relay and never forwarded.
    Log {
        /// Free text.
        #[serde(default, alias = "msg")]
        message: String,
    },

    /// Session description offer.
    Offer,

    /// Session description answer.
    Answer,

    /// Connectivity candidate.
    #[serde(alias = "candidate", alias = "ice")]
    IceCandidate,

    /// Any other negotiation payload.
    Signal,
}

impl ClientMessage {
    /// Returns `true` for kinds forwarded verbatim to the peer.
    #[must_use]
    pub const fn is_relayable(&self) -> bool {
        matches!(
            self,
            Self::Offer | Self::Answer | Self::IceCandidate | Self::Signal
        )
    }

    /// Canonical wire name of the message kind, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Join { .. } => "join",
            Self::Leave => "leave",
            Self::Log { .. } => "log",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
            Self::Signal => "signal",
        }
    }
}

/// Notifications the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The recipient is the first member of the room.
    Created {
        /// Room the recipient now occupies.
        room_id: String,
    },

    /// The recipient is the second member of the room.
    Joined {
        /// Room the recipient now occupies.
        room_id: String,
        /// Members after the join.
        count: u8,
    },

    /// The room already has two members; nothing changed.
    Full {
        /// Room that rejected the join.
        room_id: String,
    },

    /// A second member arrived in the recipient's room.
    PeerJoined {
        /// Room the peer joined.
        room_id: String,
        /// Members after the join.
        count: u8,
    },

    /// The peer left explicitly.
    PeerLeft {
        /// Room the peer left.
        room_id: String,
    },

    /// The peer's transport closed or failed.
    PeerDisconnected {
        /// Room the peer was removed from.
        room_id: String,
    },

    /// A request was rejected.
    Error {
        /// Machine-readable reason.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
}

/// Error codes reported in [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// The frame could not be decoded.
    MalformedMessage,
    /// Join against an unknown room while pre-creation is required.
    RoomNotFound,
    /// The room already holds two members.
    RoomFull,
    /// The room identifier does not satisfy the identifier rules.
    InvalidRoomId,
    /// The connection is already a member of a room.
    AlreadyInRoom,
    /// The request needs room membership.
    NotInRoom,
    /// The relay holds its maximum number of rooms.
    CapacityReached,
    /// Unexpected relay-side failure.
    InternalError,
}

impl ServerMessage {
    /// Create an error notification.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Decodes an inbound text frame.
///
/// # Errors
///
/// Returns [`ProtoError::Malformed`] for non-JSON text, a missing or unknown
/// `type`, or a kind missing one of its required fields.
pub fn decode(text: &str) -> Result<ClientMessage, ProtoError> {
    serde_json::from_str(text).map_err(|e| ProtoError::Malformed(e.to_string()))
}

/// Encodes a notification as a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtoError::Serialization`] if serialization fails.
pub fn encode(msg: &ServerMessage) -> Result<String, ProtoError> {
    serde_json::to_string(msg).map_err(|e| ProtoError::Serialization(e.to_string()))
}
