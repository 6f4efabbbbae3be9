//! Room configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every room a [`RoomManager`](crate::RoomManager)
/// activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Capacity of the actor's command channel. When it is full, callers
    /// wait (bounded channel).
    pub channel_size: usize,

    /// Capacity of each peer's outbound queue. A peer whose queue is full
    /// when the room delivers to it is dropped from the room, which closes
    /// its connection.
    pub peer_queue_size: usize,

    /// Parse a payload before relaying it, and drop it if it is not a
    /// valid envelope.
    ///
    /// Off by default: every payload is relayed to the other peers as
    /// received, and only then parsed and applied.
    pub validate_before_relay: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            channel_size: 64,
            peer_queue_size: 256,
            validate_before_relay: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.channel_size, 64);
        assert_eq!(config.peer_queue_size, 256);
        assert!(!config.validate_before_relay);
    }

    #[test]
    fn test_room_config_partial_deserialize_keeps_defaults() {
        let config: RoomConfig =
            serde_json::from_str(r#"{"validate_before_relay":true}"#).unwrap();
        assert_eq!(config.channel_size, 64);
        assert!(config.validate_before_relay);
    }
}
