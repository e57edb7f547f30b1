//! The room registry: the id → room index.
//!
//! The registry lock only guards the index. It is never held while a
//! room operation runs, with one exception: the idle sweep locks the
//! registry and then each room in turn. No code path takes a room lock
//! and then the registry lock, so the two cannot deadlock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bombforge_protocol::{PlayerId, RoomId};

use crate::{Outbox, Room, RoomConfig, Terrain};

/// Builds the terrain for each new room.
pub type TerrainFactory = Arc<dyn Fn(&RoomConfig) -> Terrain + Send + Sync>;

pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
    next_room: AtomicU64,
    next_player: AtomicU64,
    config: RoomConfig,
    terrain: TerrainFactory,
}

impl RoomRegistry {
    /// A registry whose rooms get freshly generated terrain.
    pub fn new(config: RoomConfig) -> Self {
        Self::with_terrain(config, |config: &RoomConfig| {
            Terrain::generate(
                config.width,
                config.height,
                config.block_probability,
                &mut rand::rng(),
            )
        })
    }

    /// A registry with a custom terrain source.
    pub fn with_terrain<F>(config: RoomConfig, terrain: F) -> Self
    where
        F: Fn(&RoomConfig) -> Terrain + Send + Sync + 'static,
    {
        Self {
            rooms: Mutex::new(HashMap::new()),
            next_room: AtomicU64::new(1),
            next_player: AtomicU64::new(1),
            config: config.validated(),
            terrain: Arc::new(terrain),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn next_player_id(&self) -> PlayerId {
        PlayerId(self.next_player.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds a room; without an explicit id, one is derived from the
    /// creation sequence number.
    fn build(&self, id: Option<RoomId>, max_players: usize) -> Arc<Room> {
        let seq = self.next_room.fetch_add(1, Ordering::Relaxed);
        let id = id.unwrap_or_else(|| RoomId(format!("room_{seq}")));
        let config = RoomConfig {
            max_players,
            ..self.config.clone()
        };
        let terrain = (self.terrain)(&config);
        Arc::new(Room::new(id, seq, config, terrain))
    }

    /// Creates a room with a generated id and the default capacity.
    pub fn create(&self) -> Arc<Room> {
        self.create_with_capacity(self.config.max_players)
    }

    /// Creates a room with a generated id and the given capacity.
    pub fn create_with_capacity(&self, max_players: usize) -> Arc<Room> {
        let mut rooms = self.lock();
        loop {
            let room = self.build(None, max_players.max(1));
            // A client may already have claimed this id by name.
            if rooms.contains_key(room.id()) {
                continue;
            }
            rooms.insert(room.id().clone(), Arc::clone(&room));
            tracing::info!(room_id = %room.id(), max_players, "room created");
            return room;
        }
    }

    /// Returns the room with this id, creating it if it does not exist.
    pub fn get_or_create(&self, id: &RoomId) -> Arc<Room> {
        let mut rooms = self.lock();
        if let Some(room) = rooms.get(id) {
            return Arc::clone(room);
        }
        let room = self.build(Some(id.clone()), self.config.max_players);
        rooms.insert(id.clone(), Arc::clone(&room));
        tracing::info!(room_id = %id, "room created on request");
        room
    }

    pub fn get(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &RoomId) -> Option<Arc<Room>> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            tracing::info!(room_id = %id, "room removed");
        }
        removed
    }

    /// Removes `room` only if the index still points at that same room,
    /// so a stale handle cannot remove a newer room with a reused id.
    pub fn remove_room(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.lock();
        match rooms.get(room.id()) {
            Some(current) if Arc::ptr_eq(current, room) => {
                rooms.remove(room.id());
                tracing::info!(room_id = %room.id(), "room removed");
                true
            }
            _ => false,
        }
    }

    /// All rooms, oldest first. The registry lock is released before the
    /// caller touches any room.
    pub fn snapshot(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self.lock().values().cloned().collect();
        rooms.sort_by_key(|r| r.seq());
        rooms
    }

    /// Picks a room for a new player.
    ///
    /// With a hint, that room (created if absent). Without one, the oldest
    /// waiting room with a free seat, or a new room if there is none. The
    /// pick is advisory: the join itself re-checks under the room lock.
    pub fn find_or_create(&self, hint: Option<&RoomId>) -> Arc<Room> {
        if let Some(id) = hint {
            return self.get_or_create(id);
        }
        self.snapshot()
            .into_iter()
            .find(|room| room.is_joinable())
            .unwrap_or_else(|| self.create())
    }

    /// Evicts players idle for longer than `idle_timeout` and drops rooms
    /// left with nobody in them.
    pub fn sweep(&self, now: Instant, idle_timeout: Duration) -> Outbox {
        let mut outbox = Outbox::new();
        let mut rooms = self.lock();
        rooms.retain(|id, room| {
            let departure = room.evict_idle(now, idle_timeout);
            outbox.append(departure.outbox);
            if departure.now_empty {
                outbox.append(room.close());
                tracing::info!(room_id = %id, "removed empty room");
                return false;
            }
            true
        });
        outbox
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RoomRegistry {
        RoomRegistry::with_terrain(RoomConfig::default(), |c: &RoomConfig| {
            Terrain::generate(c.width, c.height, 0.0, &mut rand::rng())
        })
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let reg = registry();
        assert_eq!(reg.create().id().as_str(), "room_1");
        assert_eq!(reg.create().id().as_str(), "room_2");
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_get_or_create_reuses_existing() {
        let reg = registry();
        let id = RoomId::from("lobby");
        let a = reg.get_or_create(&id);
        let b = reg.get_or_create(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_find_or_create_without_rooms_creates_one() {
        let reg = registry();
        let room = reg.find_or_create(None);
        assert_eq!(reg.len(), 1);
        assert!(Arc::ptr_eq(&room, &reg.find_or_create(None)));
    }

    #[test]
    fn test_remove_room_ignores_stale_handle() {
        let reg = registry();
        let id = RoomId::from("arena");
        let old = reg.get_or_create(&id);
        assert!(reg.remove_room(&old));
        let new = reg.get_or_create(&id);
        assert!(!reg.remove_room(&old), "stale handle must not remove the new room");
        assert!(Arc::ptr_eq(&reg.get(&id).unwrap(), &new));
    }

    #[test]
    fn test_player_ids_are_unique() {
        let reg = registry();
        let a = reg.next_player_id();
        let b = reg.next_player_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sweep_drops_empty_rooms() {
        let reg = registry();
        reg.create();
        let outbox = reg.sweep(Instant::now(), Duration::from_secs(60));
        assert!(reg.is_empty());
        assert_eq!(outbox.len(), 0);
    }
}
