//! Property-based tests for room membership bookkeeping.
//!
//! Uses proptest to drive a registry through arbitrary join/leave sequences
//! over a handful of connections and room ids, and checks after every step:
//! 1. No room ever holds more than two members.
//! 2. A room exists only while it has at least one member.
//! 3. Joins succeed exactly when the model says there is a free slot.
//! 4. Leaving twice is a no-op the second time.

use std::collections::HashMap;

use pairlink_relay::peer::{ConnectionId, Outbound, PeerHandle};
use pairlink_relay::rooms::{RegistryError, Role, RoomRegistry};
use proptest::prelude::*;
use tokio::sync::mpsc;

const ROOMS: [&str; 3] = ["alpha", "beta", "gamma"];
const CONNECTIONS: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    Join { conn: usize, room: usize },
    Leave { conn: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..CONNECTIONS, 0..ROOMS.len()).prop_map(|(conn, room)| Op::Join { conn, room }),
        (0..CONNECTIONS).prop_map(|conn| Op::Leave { conn }),
    ]
}

struct Harness {
    registry: RoomRegistry,
    handles: Vec<PeerHandle>,
    _receivers: Vec<mpsc::Receiver<Outbound>>,
    /// Which room each connection is in, according to the model.
    membership: HashMap<usize, usize>,
}

impl Harness {
    fn new() -> Self {
        let mut handles = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..CONNECTIONS {
            let (tx, rx) = mpsc::channel(4);
            handles.push(PeerHandle::new(ConnectionId::new(), tx));
            receivers.push(rx);
        }
        Self {
            registry: RoomRegistry::new(),
            handles,
            _receivers: receivers,
            membership: HashMap::new(),
        }
    }

    fn members_of(&self, room: usize) -> usize {
        self.membership.values().filter(|&&r| r == room).count()
    }

    fn apply(&mut self, op: &Op) -> Result<(), TestCaseError> {
        match *op {
            Op::Join { conn, room } => {
                // Sessions refuse a second join before it reaches the registry.
                if self.membership.contains_key(&conn) {
                    return Ok(());
                }
                let before = self.members_of(room);
                let result = self.registry.join(ROOMS[room], self.handles[conn].clone());
                match (before, result) {
                    (0, Ok(outcome)) => {
                        prop_assert_eq!(outcome.role, Role::First);
                        prop_assert_eq!(outcome.peer_count, 1);
                        prop_assert!(outcome.peer.is_none());
                        self.membership.insert(conn, room);
                    }
                    (1, Ok(outcome)) => {
                        prop_assert_eq!(outcome.role, Role::Second);
                        prop_assert_eq!(outcome.peer_count, 2);
                        prop_assert!(outcome.peer.is_some());
                        self.membership.insert(conn, room);
                    }
                    (2, Err(RegistryError::RoomFull)) => {}
                    (n, other) => {
                        return Err(TestCaseError::fail(format!(
                            "join with {n} members returned {other:?}"
                        )));
                    }
                }
            }
            Op::Leave { conn } => {
                let id = self.handles[conn].id();
                match self.membership.remove(&conn) {
                    Some(room) => {
                        let Some(outcome) = self.registry.leave(ROOMS[room], id) else {
                            return Err(TestCaseError::fail("member could not leave"));
                        };
                        let left = self.members_of(room);
                        prop_assert_eq!(outcome.room_deleted, left == 0);
                        prop_assert_eq!(outcome.remaining.is_some(), left == 1);
                        prop_assert!(self.registry.leave(ROOMS[room], id).is_none());
                    }
                    None => {
                        for name in ROOMS {
                            prop_assert!(self.registry.leave(name, id).is_none());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_invariants(&self) -> Result<(), TestCaseError> {
        let mut live = 0;
        for (idx, name) in ROOMS.iter().enumerate() {
            let expected = self.members_of(idx);
            prop_assert!(expected <= 2);
            match self.registry.room_info(name) {
                Some(info) => {
                    prop_assert!(info.member_count >= 1 && info.member_count <= 2);
                    prop_assert_eq!(info.member_count, expected);
                    live += 1;
                }
                None => prop_assert_eq!(expected, 0),
            }
        }
        prop_assert_eq!(self.registry.room_count(), live);
        prop_assert_eq!(self.registry.occupied_slots(), self.membership.len());
        Ok(())
    }
}

proptest! {
    #[test]
    fn membership_never_exceeds_two(ops in prop::collection::vec(arb_op(), 1..64)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op)?;
            harness.check_invariants()?;
        }
    }

    #[test]
    fn peer_lookup_matches_membership(ops in prop::collection::vec(arb_op(), 1..64)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op)?;
        }
        for (&conn, &room) in &harness.membership {
            let id = harness.handles[conn].id();
            let peer = harness.registry.peer_of(ROOMS[room], id);
            match peer {
                Some(peer) => {
                    prop_assert_ne!(peer.id(), id);
                    let other = harness.handles.iter().position(|h| h.id() == peer.id());
                    prop_assert!(other.is_some());
                    prop_assert_eq!(other.and_then(|c| harness.membership.get(&c)), Some(&room));
                }
                None => prop_assert_eq!(harness.members_of(room), 1),
            }
        }
    }

    #[test]
    fn invalid_ids_never_create_rooms(id in "[^A-Za-z0-9_-]{1,8}|[a-z]{65,80}") {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let result = registry.join(&id, PeerHandle::new(ConnectionId::new(), tx));
        prop_assert!(matches!(result, Err(RegistryError::InvalidRoomId)));
        prop_assert_eq!(registry.room_count(), 0);
    }
}
