//! Room manager: activates rooms on first access and tracks them.

use std::collections::HashMap;
use std::sync::Arc;

use murmur_protocol::RoomId;
use murmur_store::{SqliteStore, StoreLocation};
use tokio::sync::{Mutex, OnceCell};

use crate::room::spawn_room;
use crate::{RoomConfig, RoomError, RoomHandle, RoomInfo};

/// One entry of the registry. Empty until its room has been activated.
type RoomSlot = Arc<OnceCell<RoomHandle>>;

/// Registry of active rooms.
///
/// A room is activated the first time anyone asks for it: its database is
/// opened at the manager's [`StoreLocation`], migrated and loaded, and an
/// actor is spawned over it. It then stays active, with or without peers,
/// until it is shut down.
///
/// The registry lock only guards the map. Activation runs on the room's
/// own slot, so opening one room's database never delays lookups of
/// another, and concurrent callers for the same room share one
/// activation.
pub struct RoomManager {
    rooms: Mutex<HashMap<RoomId, RoomSlot>>,
    location: StoreLocation,
    config: RoomConfig,
}

impl RoomManager {
    pub fn new(location: StoreLocation, config: RoomConfig) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            location,
            config,
        }
    }

    /// Returns the running room, activating it first if needed.
    ///
    /// If activation fails the error is returned and the slot stays
    /// empty, so the next call tries again.
    pub async fn get_or_activate(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        let slot = self.slot(room_id).await;
        let handle = slot
            .get_or_try_init(|| self.activate(room_id))
            .await
            .inspect_err(|e| tracing::error!(%room_id, error = %e, "room activation failed"))?;
        Ok(handle.clone())
    }

    /// Returns the slot for `room_id`, replacing it if its actor has
    /// stopped.
    async fn slot(&self, room_id: &RoomId) -> RoomSlot {
        let mut rooms = self.rooms.lock().await;
        let slot = rooms.entry(room_id.clone()).or_default();
        if slot.get().is_some_and(RoomHandle::is_closed) {
            tracing::debug!(%room_id, "room actor gone, reactivating");
            *slot = RoomSlot::default();
        }
        Arc::clone(slot)
    }

    async fn activate(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        let store = SqliteStore::open(&self.location, room_id).await?;
        let handle = spawn_room(room_id.clone(), store, self.config.clone()).await?;
        tracing::info!(%room_id, "room activated");
        Ok(handle)
    }

    /// The handle of `room_id` if it is active.
    async fn active(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.lock().await.get(room_id)?.get().cloned()
    }

    pub async fn get_room_info(&self, room_id: &RoomId) -> Result<RoomInfo, RoomError> {
        let handle = self
            .active(room_id)
            .await
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        handle.get_info().await
    }

    /// Shuts a room down and forgets it. Its history stays in the store.
    pub async fn shutdown_room(&self, room_id: &RoomId) -> Result<(), RoomError> {
        let slot = self.rooms.lock().await.remove(room_id);
        let handle = slot
            .and_then(|slot| slot.get().cloned())
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        let _ = handle.shutdown().await;
        tracing::info!(%room_id, "room shut down");
        Ok(())
    }

    /// Shuts down every active room.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(RoomId, RoomSlot)> = self.rooms.lock().await.drain().collect();
        for (room_id, slot) in drained {
            let Some(handle) = slot.get() else { continue };
            if handle.shutdown().await.is_err() {
                tracing::debug!(%room_id, "room already stopped");
            }
        }
    }

    /// Number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(room_id, _)| room_id.clone())
            .collect()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(StoreLocation::InMemory, RoomConfig::default())
    }
}
