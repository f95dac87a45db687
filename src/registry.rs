//! Process-wide room registry: id → room, plus the idle sweep.
//!
//! Rooms are created on demand, removed when their last member leaves,
//! and swept on a timer when they sit empty past the idle threshold. The
//! registry's map lock never waits on a room lock: where both are needed
//! the room lock is tried non-blockingly, and a room that is busy is by
//! definition not idle.

use crate::protocol::{normalize_room_id, RoomStats, ROOM_ID_LEN};
use crate::room::Room;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Alphabet for generated room ids.
const ROOM_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a candidate room id: six characters from `[A-Z0-9]`.
pub fn generate_room_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_CHARSET[rng.gen_range(0..ROOM_ID_CHARSET.len())] as char)
        .collect()
}

pub type SharedRoom = Arc<Mutex<Room>>;

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    max_users_per_room: usize,
    broadcast_capacity: usize,
}

impl RoomRegistry {
    pub fn new(max_users_per_room: usize, broadcast_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_users_per_room,
            broadcast_capacity,
        }
    }

    /// Create a fresh room under a newly allocated id, retrying on the
    /// unlikely id collision. The caller joins its own session afterwards;
    /// the registry adds no members.
    pub async fn create(&self) -> (String, SharedRoom) {
        let mut rooms = self.rooms.write().await;
        loop {
            let id = generate_room_id();
            if rooms.contains_key(&id) {
                continue;
            }
            let room = Arc::new(Mutex::new(Room::new(
                id.clone(),
                self.max_users_per_room,
                self.broadcast_capacity,
            )));
            rooms.insert(id.clone(), room.clone());
            log::info!("Created room {id}");
            return (id, room);
        }
    }

    /// Look up a room. Ids are case-insensitive: the raw id is normalized
    /// before the map is consulted.
    pub async fn lookup(&self, raw_id: &str) -> Option<SharedRoom> {
        let id = normalize_room_id(raw_id);
        self.rooms.read().await.get(&id).cloned()
    }

    /// Unlink a room unconditionally.
    pub async fn remove(&self, raw_id: &str) -> bool {
        let id = normalize_room_id(raw_id);
        let removed = self.rooms.write().await.remove(&id).is_some();
        if removed {
            log::info!("Removed room {id}");
        }
        removed
    }

    /// Unlink a room if it is empty right now. The room lock is tried
    /// non-blockingly; a busy room is kept (a concurrent join may be in
    /// flight) and the sweep will revisit it.
    pub async fn remove_if_empty(&self, raw_id: &str) -> bool {
        let id = normalize_room_id(raw_id);
        let mut rooms = self.rooms.write().await;
        let empty = match rooms.get(&id) {
            Some(room) => match room.try_lock() {
                Ok(guard) => guard.member_count() == 0,
                Err(_) => false,
            },
            None => false,
        };
        if empty {
            rooms.remove(&id);
            log::info!("Removed empty room {id}");
        }
        empty
    }

    /// Remove every room that has sat empty past `idle_ms`. Returns how
    /// many were removed.
    pub async fn sweep(&self, idle_ms: u64) -> usize {
        let mut rooms = self.rooms.write().await;
        let stale: Vec<String> = rooms
            .iter()
            .filter_map(|(id, room)| match room.try_lock() {
                Ok(guard) if guard.should_cleanup(idle_ms) => Some(id.clone()),
                _ => None,
            })
            .collect();
        for id in &stale {
            rooms.remove(id);
            log::info!("Swept idle room {id}");
        }
        stale.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Stats for every room, for the health endpoint. Busy rooms are
    /// skipped rather than waited on.
    pub async fn stats_snapshot(&self) -> Vec<RoomStats> {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .filter_map(|room| room.try_lock().ok().map(|guard| guard.stats()))
            .collect()
    }

    /// Run the periodic sweep until the registry is dropped.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, idle_ms: u64) {
        let registry = Arc::downgrade(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let removed = registry.sweep(idle_ms).await;
                if removed > 0 {
                    log::info!("Sweep removed {removed} idle rooms");
                }
            }
        });
    }
}
