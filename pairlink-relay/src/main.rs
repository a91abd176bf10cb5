//! Pairlink relay server: two-party signaling for browser file transfer.
//!
//! An axum WebSocket server that pairs clients in rooms of two and forwards
//! their offer/answer/candidate messages untouched. `GET /create` hands out
//! room ids for share links; `GET /status` reports registry counters.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:3000
//! cargo run --bin pairlink-relay
//!
//! # Run on custom address with a shorter room TTL
//! cargo run --bin pairlink-relay -- --bind 127.0.0.1:8080 --room-ttl-secs 900
//!
//! # Or via environment variable
//! PAIRLINK_ADDR=127.0.0.1:8080 cargo run --bin pairlink-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use pairlink_relay::config::{RelayCliArgs, RelayConfig};
use pairlink_relay::relay::{self, RelayState};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        room_ttl_secs = config.room_ttl_secs,
        max_rooms = config.max_rooms,
        "starting pairlink relay server"
    );

    let state = Arc::new(RelayState::with_config(&config));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
