//! Pairlink relay server library.
//!
//! Exposes the relay server for use in tests and embedding. Browser clients
//! connect over WebSocket, pair up in two-member rooms, and exchange
//! negotiation messages (and optionally raw file bytes) through the relay
//! until they have a direct channel of their own.

pub mod config;
pub mod dispatch;
pub mod peer;
pub mod relay;
pub mod rooms;
pub mod session;
pub mod sweeper;
