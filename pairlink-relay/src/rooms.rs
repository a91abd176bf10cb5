//! Room registry for the relay server.
//!
//! Maps room identifiers to two-slot rooms. Rooms are created lazily on the
//! first join to an unknown identifier (or explicitly with a generated id)
//! and deleted as soon as their last member leaves or the sweeper finds them
//! older than the configured TTL.
//!
//! Every operation is one short critical section on a single mutex, so
//! capacity checks and membership changes never interleave. Nothing inside
//! the lock awaits or writes to a socket; callers get cloned [`PeerHandle`]s
//! back and deliver after the lock is released.
//!
//! Room entries are ephemeral and lost on relay restart.

use std::collections::HashMap;
use std::time::Duration;

use pairlink_proto::{ErrorCode, MAX_ROOM_ID_LEN, is_valid_room_id};
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::peer::{ConnectionId, PeerHandle};

/// Default maximum number of rooms the registry will hold.
pub const DEFAULT_MAX_ROOMS: usize = 10_000;

/// Attempts at drawing an unused identifier before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Errors that can occur during room registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Both slots of the room are occupied.
    #[error("room is full")]
    RoomFull,
    /// The room does not exist and implicit creation is disabled.
    #[error("room not found")]
    RoomNotFound,
    /// The connection already occupies a slot in the room.
    #[error("already a member of this room")]
    AlreadyMember,
    /// The registry has reached its maximum number of rooms.
    #[error("room registry is full (max {0} rooms)")]
    CapacityReached(usize),
    /// No unused identifier could be generated.
    #[error("could not allocate an unused room id")]
    IdExhausted,
    /// The identifier breaks the room id rules.
    #[error("invalid room id (1-{MAX_ROOM_ID_LEN} characters of [A-Za-z0-9_-])")]
    InvalidRoomId,
}

impl RegistryError {
    /// The error code reported to the client.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RoomFull => ErrorCode::RoomFull,
            Self::RoomNotFound => ErrorCode::RoomNotFound,
            Self::AlreadyMember => ErrorCode::AlreadyInRoom,
            Self::CapacityReached(_) => ErrorCode::CapacityReached,
            Self::IdExhausted => ErrorCode::InternalError,
            Self::InvalidRoomId => ErrorCode::InvalidRoomId,
        }
    }
}

/// Arrival position of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The room was empty before the join.
    First,
    /// The join filled the room.
    Second,
}

/// A rendezvous point for at most two connections.
///
/// Membership is a pair of slots, so a third member cannot be represented.
#[derive(Debug)]
pub struct Room {
    id: String,
    slots: [Option<PeerHandle>; 2],
    created_at: Instant,
}

impl Room {
    fn new(id: String, created_at: Instant) -> Self {
        Self {
            id,
            slots: [None, None],
            created_at,
        }
    }

    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of occupied slots (0, 1 or 2).
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Returns `true` if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Returns `true` if `conn` occupies a slot.
    #[must_use]
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.slots.iter().flatten().any(|p| p.id() == conn)
    }

    /// Time elapsed between creation and `now`.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    fn admit(&mut self, peer: PeerHandle) -> Result<Role, RegistryError> {
        if self.contains(peer.id()) {
            return Err(RegistryError::AlreadyMember);
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(RegistryError::RoomFull)?;
        *slot = Some(peer);
        Ok(if self.member_count() == 1 {
            Role::First
        } else {
            Role::Second
        })
    }

    fn remove(&mut self, conn: ConnectionId) -> bool {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|p| p.id() == conn) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// The other occupant, provided `conn` is itself a member.
    fn peer_of(&self, conn: ConnectionId) -> Option<&PeerHandle> {
        match &self.slots {
            [Some(a), b] if a.id() == conn => b.as_ref(),
            [a, Some(b)] if b.id() == conn => a.as_ref(),
            _ => None,
        }
    }
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    /// Room identifier.
    pub room_id: String,
    /// Occupied slots.
    pub member_count: usize,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Arrival position of the joiner.
    pub role: Role,
    /// Members after the join.
    pub peer_count: u8,
    /// The member that was already present, if any.
    pub peer: Option<PeerHandle>,
}

/// Result of removing an actual member.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    /// The member still in the room, if any.
    pub remaining: Option<PeerHandle>,
    /// `true` if the room became empty and was deleted.
    pub room_deleted: bool,
}

/// In-memory registry of two-party rooms.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Room>>,
    max_rooms: usize,
    require_existing: bool,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates an empty registry that creates rooms implicitly on join.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ROOMS, false)
    }

    /// Creates an empty registry with a room cap and join policy.
    ///
    /// With `require_existing` set, joining an unknown id fails with
    /// [`RegistryError::RoomNotFound`] instead of creating the room.
    #[must_use]
    pub fn with_limits(max_rooms: usize, require_existing: bool) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            max_rooms,
            require_existing,
        }
    }

    /// Allocates an empty room under a fresh random identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapacityReached`] when the registry is full,
    /// or [`RegistryError::IdExhausted`] if every generated id collided.
    pub fn create_room(&self) -> Result<String, RegistryError> {
        let mut rooms = self.rooms.lock();
        if rooms.len() >= self.max_rooms {
            return Err(RegistryError::CapacityReached(self.max_rooms));
        }
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = Uuid::new_v4().simple().to_string();
            if !rooms.contains_key(&id) {
                rooms.insert(id.clone(), Room::new(id.clone(), Instant::now()));
                return Ok(id);
            }
        }
        Err(RegistryError::IdExhausted)
    }

    /// Returns the room named `room_id`, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidRoomId`] or
    /// [`RegistryError::CapacityReached`]; creation is not subject to the
    /// `require_existing` policy.
    pub fn get_or_create_room(&self, room_id: &str) -> Result<RoomInfo, RegistryError> {
        let mut rooms = self.rooms.lock();
        let room = self.entry(&mut rooms, room_id, true)?;
        Ok(RoomInfo {
            room_id: room.id.clone(),
            member_count: room.member_count(),
        })
    }

    /// Admits `peer` into `room_id`, creating the room when allowed.
    ///
    /// On error nothing changes: a rejected joiner never creates a room.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomFull`] if both slots are taken, plus the
    /// creation errors of [`Self::get_or_create_room`] and
    /// [`RegistryError::RoomNotFound`] under the `require_existing` policy.
    pub fn join(&self, room_id: &str, peer: PeerHandle) -> Result<JoinOutcome, RegistryError> {
        let mut rooms = self.rooms.lock();
        let room = self.entry(&mut rooms, room_id, !self.require_existing)?;
        let joiner = peer.id();
        let role = room.admit(peer)?;
        Ok(JoinOutcome {
            role,
            peer_count: if role == Role::First { 1 } else { 2 },
            peer: room.peer_of(joiner).cloned(),
        })
    }

    /// Removes `conn` from `room_id`, deleting the room once it is empty.
    ///
    /// Returns `None` if `conn` was not a member, so repeated cleanup of the
    /// same connection is a no-op.
    pub fn leave(&self, room_id: &str, conn: ConnectionId) -> Option<LeaveOutcome> {
        let mut rooms = self.rooms.lock();
        let room = rooms.get_mut(room_id)?;
        if !room.remove(conn) {
            return None;
        }
        let remaining = room.slots.iter().flatten().next().cloned();
        let room_deleted = room.is_empty();
        if room_deleted {
            rooms.remove(room_id);
        }
        drop(rooms);
        Some(LeaveOutcome {
            remaining,
            room_deleted,
        })
    }

    /// The other member of `room_id`, if `conn` is a member and not alone.
    #[must_use]
    pub fn peer_of(&self, room_id: &str, conn: ConnectionId) -> Option<PeerHandle> {
        let rooms = self.rooms.lock();
        rooms.get(room_id)?.peer_of(conn).cloned()
    }

    /// Whether `conn` currently occupies a slot in `room_id`.
    #[must_use]
    pub fn is_member(&self, room_id: &str, conn: ConnectionId) -> bool {
        let rooms = self.rooms.lock();
        rooms.get(room_id).is_some_and(|r| r.contains(conn))
    }

    /// Deletes every room older than `ttl` at `now`, returning their ids.
    ///
    /// Remaining members are dropped without notification.
    pub fn sweep_expired(&self, now: Instant, ttl: Duration) -> Vec<String> {
        let mut rooms = self.rooms.lock();
        let expired: Vec<String> = rooms
            .values()
            .filter(|r| r.age(now) > ttl)
            .map(|r| r.id.clone())
            .collect();
        for id in &expired {
            rooms.remove(id);
        }
        expired
    }

    /// Snapshot of one room.
    #[must_use]
    pub fn room_info(&self, room_id: &str) -> Option<RoomInfo> {
        let rooms = self.rooms.lock();
        rooms.get(room_id).map(|r| RoomInfo {
            room_id: r.id.clone(),
            member_count: r.member_count(),
        })
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Number of occupied slots across all rooms.
    #[must_use]
    pub fn occupied_slots(&self) -> usize {
        self.rooms.lock().values().map(Room::member_count).sum()
    }

    fn entry<'a>(
        &self,
        rooms: &'a mut HashMap<String, Room>,
        room_id: &str,
        create: bool,
    ) -> Result<&'a mut Room, RegistryError> {
        if !is_valid_room_id(room_id) {
            return Err(RegistryError::InvalidRoomId);
        }
        if !rooms.contains_key(room_id) {
            if !create {
                return Err(RegistryError::RoomNotFound);
            }
            if rooms.len() >= self.max_rooms {
                return Err(RegistryError::CapacityReached(self.max_rooms));
            }
        }
        Ok(rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string(), Instant::now())))
    }
}
