//! Property-based tests for the signaling envelope.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never panics `decode` (it returns `Err` gracefully).
//! 2. A join decodes to the exact room string under every field spelling.
//! 3. Negotiation kinds decode as relayable whatever their body holds.
//! 4. Unknown `type` tags are always rejected.
//! 5. Encoded notifications carry a kebab-case `type` and camelCase keys.

use pairlink_proto::signal::{self, ClientMessage};
use pairlink_proto::{ErrorCode, ServerMessage, is_valid_room_id};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

const KNOWN_KINDS: [&str; 12] = [
    "create",
    "create-session",
    "join",
    "join-session",
    "leave",
    "log",
    "offer",
    "answer",
    "ice-candidate",
    "candidate",
    "ice",
    "signal",
];

/// Strategy for arbitrary JSON leaf and shallow nested values.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        ".{0,32}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for the body fields a browser attaches to negotiation frames.
fn arb_body() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-zA-Z]{1,10}", arb_json(), 0..5).prop_map(|m| {
        m.into_iter()
            .filter(|(k, _)| k != "type")
            .collect::<Map<_, _>>()
    })
}

fn arb_server_message() -> impl Strategy<Value = ServerMessage> {
    let room = "[A-Za-z0-9_-]{1,64}";
    prop_oneof![
        room.prop_map(|room_id| ServerMessage::Created { room_id }),
        (room, 1u8..=2).prop_map(|(room_id, count)| ServerMessage::Joined { room_id, count }),
        room.prop_map(|room_id| ServerMessage::Full { room_id }),
        room.prop_map(|room_id| ServerMessage::PeerJoined { room_id, count: 2 }),
        room.prop_map(|room_id| ServerMessage::PeerLeft { room_id }),
        room.prop_map(|room_id| ServerMessage::PeerDisconnected { room_id }),
        ".{0,40}".prop_map(|m| ServerMessage::error(ErrorCode::MalformedMessage, m)),
    ]
}

proptest! {
    #[test]
    fn decode_never_panics(text in ".{0,256}") {
        let _ = signal::decode(&text);
    }

    #[test]
    fn decode_never_panics_on_json_objects(body in arb_body(), kind in ".{0,16}") {
        let mut obj = body;
        obj.insert("type".to_string(), Value::String(kind));
        let _ = signal::decode(&Value::Object(obj).to_string());
    }

    #[test]
    fn join_preserves_room_string(
        room in ".{0,80}",
        field in prop::sample::select(vec!["roomId", "room", "session", "sessionId"]),
    ) {
        let text = json!({ "type": "join", field: room }).to_string();
        prop_assert_eq!(
            signal::decode(&text).ok(),
            Some(ClientMessage::Join { room_id: room.clone() })
        );
    }

    #[test]
    fn negotiation_kinds_are_relayable_with_any_body(
        body in arb_body(),
        kind in prop::sample::select(vec!["offer", "answer", "ice-candidate", "candidate", "ice", "signal"]),
    ) {
        let mut obj = body;
        obj.insert("type".to_string(), Value::String(kind.to_string()));
        let msg = signal::decode(&Value::Object(obj).to_string());
        prop_assert!(msg.is_ok_and(|m| m.is_relayable()));
    }

    #[test]
    fn unknown_kinds_are_rejected(kind in "[a-z-]{1,16}", body in arb_body()) {
        prop_assume!(!KNOWN_KINDS.contains(&kind.as_str()));
        let mut obj = body;
        obj.insert("type".to_string(), Value::String(kind));
        prop_assert!(signal::decode(&Value::Object(obj).to_string()).is_err());
    }

    #[test]
    fn notifications_use_wire_naming(msg in arb_server_message()) {
        let text = signal::encode(&msg).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let obj = value.as_object().ok_or_else(|| TestCaseError::fail("not an object"))?;

        let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
        prop_assert!(!kind.is_empty());
        prop_assert!(kind.chars().all(|c| c.is_ascii_lowercase() || c == '-'));
        for key in obj.keys() {
            prop_assert!(!key.contains('_'), "snake_case key {}", key);
        }
        if let Some(room) = obj.get("roomId") {
            prop_assert!(room.as_str().is_some_and(is_valid_room_id));
        }
    }
}
