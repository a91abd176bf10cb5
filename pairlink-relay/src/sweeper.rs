//! Background eviction of rooms that outlived their TTL.
//!
//! This is a leak guard for abandoned rooms (a creator who never got a peer,
//! a room allocated over HTTP and never joined). Active departures are
//! cleaned up immediately by the sessions themselves.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::rooms::RoomRegistry;

/// Removes every room older than `ttl` right now, returning how many.
pub fn sweep_once(registry: &RoomRegistry, ttl: Duration) -> usize {
    let removed = registry.sweep_expired(Instant::now(), ttl);
    for room_id in &removed {
        tracing::info!(room_id = %room_id, "room removed (ttl expired)");
    }
    removed.len()
}

/// Spawns the periodic sweep task.
///
/// The first sweep runs one `every` after spawning. The task runs until it
/// is aborted.
pub fn spawn(registry: Arc<RoomRegistry>, every: Duration, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = sweep_once(&registry, ttl);
            if removed > 0 {
                tracing::debug!(
                    removed,
                    remaining = registry.room_count(),
                    "room sweep finished"
                );
            }
        }
    })
}
