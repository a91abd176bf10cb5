//! Room identifier rules shared by clients and the relay.

/// Longest client-chosen room identifier accepted by the relay.
pub const MAX_ROOM_ID_LEN: usize = 64;

/// Returns `true` if `id` is usable as a room identifier.
///
/// Identifiers are 1 to [`MAX_ROOM_ID_LEN`] characters drawn from ASCII
/// letters, digits, `-` and `_`, so they can be embedded in a share link
/// query string without escaping.
#[must_use]
pub fn is_valid_room_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ROOM_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
