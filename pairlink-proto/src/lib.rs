//! Shared signaling definitions for the Pairlink relay.
//!
//! Browser clients talk to the relay with JSON text frames carrying a `type`
//! discriminator. Control kinds (`create`, `join`, `leave`, `log`) are
//! interpreted by the relay; negotiation kinds are forwarded verbatim to the
//! other member of the sender's room.

pub mod room_id;
pub mod signal;

pub use room_id::{MAX_ROOM_ID_LEN, is_valid_room_id};
pub use signal::{ClientMessage, ErrorCode, ProtoError, ServerMessage};
