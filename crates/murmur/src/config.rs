//! Server configuration loaded from the environment.

use std::env;
use std::path::PathBuf;

use murmur_room::RoomConfig;
use murmur_store::StoreLocation;

use crate::MurmurError;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:1999";

/// Default path prefix; a room named `lobby` is served at
/// `/parties/chat/lobby`.
pub const DEFAULT_ROUTE_PREFIX: &str = "/parties/chat/";

/// Everything needed to build a [`MurmurServer`](crate::MurmurServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub route_prefix: String,
    pub store: StoreLocation,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            store: StoreLocation::InMemory,
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables, reading a `.env`
    /// file first if one is present.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `MURMUR_BIND` | `127.0.0.1:1999` |
    /// | `MURMUR_DATA_DIR` | unset: in-memory databases |
    /// | `MURMUR_ROUTE_PREFIX` | `/parties/chat/` |
    /// | `MURMUR_VALIDATE_BEFORE_RELAY` | `false` |
    /// | `MURMUR_PEER_QUEUE_SIZE` | `256` |
    pub fn from_env() -> Result<Self, MurmurError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MurmurError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("MURMUR_BIND") {
            config.bind = bind;
        }
        if let Some(dir) = lookup("MURMUR_DATA_DIR").filter(|d| !d.is_empty()) {
            config.store = StoreLocation::Directory(PathBuf::from(dir));
        }
        if let Some(prefix) = lookup("MURMUR_ROUTE_PREFIX") {
            config.route_prefix = prefix;
        }
        if let Some(flag) = lookup("MURMUR_VALIDATE_BEFORE_RELAY") {
            config.room.validate_before_relay = parse_flag("MURMUR_VALIDATE_BEFORE_RELAY", &flag)?;
        }
        if let Some(size) = lookup("MURMUR_PEER_QUEUE_SIZE") {
            config.room.peer_queue_size = match size.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(MurmurError::Config {
                        var: "MURMUR_PEER_QUEUE_SIZE",
                        reason: format!("{size:?} is not a positive integer"),
                    });
                }
            };
        }

        if !config.route_prefix.starts_with('/') {
            return Err(MurmurError::Config {
                var: "MURMUR_ROUTE_PREFIX",
                reason: format!("{:?} must start with '/'", config.route_prefix),
            });
        }
        Ok(config)
    }
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, MurmurError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(MurmurError::Config {
            var,
            reason: format!("{other:?} is not a boolean"),
        }),
    }
}
