//! Maps a connection's request path to a room.

use murmur_protocol::RoomId;

/// Extracts the room from `path` if it is `<prefix><room>`.
///
/// A query string and a single trailing slash are ignored. Anything else
/// after the prefix must be a valid room name.
pub fn room_for_path(prefix: &str, path: &str) -> Option<RoomId> {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let name = path.strip_prefix(prefix)?;
    let name = name.strip_suffix('/').unwrap_or(name);
    RoomId::parse(name).ok()
}
