//! Configuration system for the Pairlink relay server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pairlink-relay/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

use crate::rooms::DEFAULT_MAX_ROOMS;

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A resolved value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the relay.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
    rooms: RoomsFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_message_size: Option<usize>,
    outbound_buffer: Option<usize>,
    relay_binary: Option<bool>,
}

/// `[rooms]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RoomsFileConfig {
    room_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    max_rooms: Option<usize>,
    require_existing_room: Option<bool>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Pairlink signaling relay")]
#[allow(clippy::struct_excessive_bools)]
pub struct RelayCliArgs {
    /// Address to bind the relay server to.
    #[arg(short, long, env = "PAIRLINK_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/pairlink-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest accepted WebSocket message in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Frames buffered per connection before forwarding to it is skipped.
    #[arg(long)]
    pub outbound_buffer: Option<usize>,

    /// Seconds after creation before an idle room is evicted.
    #[arg(long)]
    pub room_ttl_secs: Option<u64>,

    /// Seconds between room sweeps.
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Maximum number of live rooms.
    #[arg(long)]
    pub max_rooms: Option<usize>,

    /// Reject joins to rooms that were not created first.
    #[arg(long)]
    pub require_existing_room: bool,

    /// Drop binary frames instead of relaying them to the peer.
    #[arg(long)]
    pub no_binary_relay: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PAIRLINK_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:3000`).
    pub bind_addr: String,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Whether binary frames are relayed to the peer.
    pub relay_binary: bool,
    /// Room time-to-live in seconds, measured from creation.
    pub room_ttl_secs: u64,
    /// Seconds between sweeps.
    pub sweep_interval_secs: u64,
    /// Maximum number of live rooms.
    pub max_rooms: usize,
    /// Whether joins require a previously created room.
    pub require_existing_room: bool,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            max_message_size: 1024 * 1024,
            outbound_buffer: 256,
            relay_binary: true,
            room_ttl_secs: 60 * 60,
            sweep_interval_secs: 5 * 60,
            max_rooms: DEFAULT_MAX_ROOMS,
            require_existing_room: false,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or a resolved value is out of range.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Room time-to-live.
    #[must_use]
    pub const fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_secs)
    }

    /// Interval between sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first zero-valued limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("room_ttl_secs", self.room_ttl_secs == 0),
            ("sweep_interval_secs", self.sweep_interval_secs == 0),
            ("outbound_buffer", self.outbound_buffer == 0),
            ("max_rooms", self.max_rooms == 0),
            ("max_message_size", self.max_message_size == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(ConfigError::Invalid(format!("{name} must be greater than 0"))),
            None => Ok(()),
        }
    }

    /// Resolve a `RelayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_message_size: cli
                .max_message_size
                .or(file.server.max_message_size)
                .unwrap_or(defaults.max_message_size),
            outbound_buffer: cli
                .outbound_buffer
                .or(file.server.outbound_buffer)
                .unwrap_or(defaults.outbound_buffer),
            relay_binary: !cli.no_binary_relay
                && file.server.relay_binary.unwrap_or(defaults.relay_binary),
            room_ttl_secs: cli
                .room_ttl_secs
                .or(file.rooms.room_ttl_secs)
                .unwrap_or(defaults.room_ttl_secs),
            sweep_interval_secs: cli
                .sweep_interval_secs
                .or(file.rooms.sweep_interval_secs)
                .unwrap_or(defaults.sweep_interval_secs),
            max_rooms: cli
                .max_rooms
                .or(file.rooms.max_rooms)
                .unwrap_or(defaults.max_rooms),
            require_existing_room: cli.require_existing_room
                || file
                    .rooms
                    .require_existing_room
                    .unwrap_or(defaults.require_existing_room),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the relay.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("pairlink-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
