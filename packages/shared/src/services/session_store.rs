use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::player::PlayerIdentity;
use crate::models::room::Room;
use crate::services::errors::SessionError;
use crate::services::room_actor::{prepare_room, PendingRoom, RoomContext, RoomHandle};

/// Identity key -> the one room that identity is currently seated in,
/// plus the rooms it watches and any result it missed while offline.
#[derive(Default)]
pub struct CurrentRooms {
    rooms: RwLock<HashMap<String, String>>,
    spectating: RwLock<HashMap<String, HashSet<String>>>,
    held_results: RwLock<HashMap<String, String>>,
}

impl CurrentRooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn assign(&self, identity: &PlayerIdentity, room_id: &str) {
        if identity.is_engine() {
            return;
        }
        self.rooms
            .write()
            .await
            .insert(identity.key(), room_id.to_string());
    }

    /// Clears the entry only if it still points at `room_id`.
    pub async fn release(&self, identity: &PlayerIdentity, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        let key = identity.key();
        if rooms.get(&key).map(String::as_str) == Some(room_id) {
            rooms.remove(&key);
        }
    }

    pub async fn get(&self, identity: &PlayerIdentity) -> Option<String> {
        self.rooms.read().await.get(&identity.key()).cloned()
    }

    pub async fn watch(&self, identity: &PlayerIdentity, room_id: &str) {
        self.spectating
            .write()
            .await
            .entry(identity.key())
            .or_default()
            .insert(room_id.to_string());
    }

    pub async fn take_watched(&self, identity: &PlayerIdentity) -> Vec<String> {
        self.spectating
            .write()
            .await
            .remove(&identity.key())
            .map(|rooms| rooms.into_iter().collect())
            .unwrap_or_default()
    }

    /// Remembers a game that ended while `identity` was offline.
    pub async fn hold_result(&self, identity: &PlayerIdentity, room_id: &str) {
        if identity.is_engine() {
            return;
        }
        self.held_results
            .write()
            .await
            .insert(identity.key(), room_id.to_string());
    }

    pub async fn take_held_result(&self, identity: &PlayerIdentity) -> Option<String> {
        self.held_results.write().await.remove(&identity.key())
    }

    /// Drops every reference to an evicted room.
    pub async fn forget_room(&self, room_id: &str) {
        self.rooms.write().await.retain(|_, r| r != room_id);
        self.held_results.write().await.retain(|_, r| r != room_id);
        let mut spectating = self.spectating.write().await;
        for rooms in spectating.values_mut() {
            rooms.remove(room_id);
        }
        spectating.retain(|_, rooms| !rooms.is_empty());
    }
}

/// Owns every live room. Room state itself lives inside each room's actor;
/// the store only holds their addresses.
pub struct SessionStore {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    context: Arc<RoomContext>,
    retention: Duration,
}

impl SessionStore {
    pub fn new(context: Arc<RoomContext>, retention: Duration) -> Self {
        SessionStore {
            rooms: RwLock::new(HashMap::new()),
            context,
            retention,
        }
    }

    pub fn current_rooms(&self) -> &Arc<CurrentRooms> {
        &self.context.current_rooms
    }

    /// Registers a freshly built room and makes it the current room of
    /// everyone seated in it. The handle is findable before any seat points
    /// at it; the caller starts the actor once its notifications are out.
    pub async fn open(&self, room: Room) -> PendingRoom {
        let seated: Vec<PlayerIdentity> = room.slots().map(|s| s.identity.clone()).collect();
        let room_id = room.room_id.clone();

        let pending = prepare_room(room, self.context.clone());
        self.rooms
            .write()
            .await
            .insert(room_id.clone(), pending.handle().clone());
        for identity in &seated {
            self.context.current_rooms.assign(identity, &room_id).await;
        }
        pending
    }

    pub async fn get(&self, room_id: &str) -> Result<RoomHandle, SessionError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| SessionError::room_not_found(room_id))
    }

    pub async fn current_room(&self, identity: &PlayerIdentity) -> Option<RoomHandle> {
        let room_id = self.context.current_rooms.get(identity).await?;
        match self.get(&room_id).await {
            Ok(handle) => Some(handle),
            Err(_) => {
                self.context.current_rooms.release(identity, &room_id).await;
                None
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// One eviction pass. Each room decides inside its own actor, so the
    /// verdict cannot interleave with a command it is still handling.
    pub async fn sweep(&self) -> usize {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut evicted = Vec::new();

        for handle in handles {
            match handle.expire(self.retention).await {
                Ok(false) => {}
                Ok(true) | Err(_) => evicted.push(handle.room_id().to_string()),
            }
        }

        if !evicted.is_empty() {
            let mut rooms = self.rooms.write().await;
            for room_id in &evicted {
                rooms.remove(room_id);
                debug!(room_id = %room_id, "Room evicted");
            }
            drop(rooms);
            for room_id in &evicted {
                self.context.current_rooms.forget_room(room_id).await;
            }
            info!(count = evicted.len(), "Evicted idle rooms");
        }
        evicted.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
