//! Room registry
//!
//! Creates rooms on the first local join and destroys them when the last local
//! member leaves, holding one reference on the room's pub/sub channel while the
//! room exists.

use super::Room;
use crate::connection::Connection;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use watch_cache::{PubSubChannel, PubSubResult, SubscriptionManager};
use watch_core::RoomId;

type Lifecycle = Arc<Mutex<()>>;

/// Room id -> local room
///
/// Lookups go through the map directly. Creation and destruction of one room are
/// serialized by that room's lifecycle lock, which is always taken before the
/// subscription manager's topic lock and never while it is held. Unrelated rooms
/// never wait on each other.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Room>>,
    lifecycles: DashMap<RoomId, Lifecycle>,
    subscriptions: Arc<SubscriptionManager>,
}

impl RoomRegistry {
    pub fn new(subscriptions: Arc<SubscriptionManager>) -> Self {
        Self {
            rooms: DashMap::new(),
            lifecycles: DashMap::new(),
            subscriptions,
        }
    }

    /// Add a connection to a room, creating and subscribing it if needed
    ///
    /// Returns false if the connection was already a local member.
    pub async fn join(&self, room_id: RoomId, conn: &Arc<Connection>) -> PubSubResult<bool> {
        let (lifecycle, guard) = self.lock(room_id).await;

        let room = match self.rooms.get(&room_id).map(|r| r.clone()) {
            Some(room) => room,
            None => {
                if let Err(err) = self.subscriptions.add(PubSubChannel::room(room_id)).await {
                    self.unlock(room_id, &lifecycle, guard);
                    return Err(err);
                }
                let room = Arc::new(Room::new(room_id));
                self.rooms.insert(room_id, room.clone());

                tracing::debug!(room_id = %room_id, "Room created");
                room
            }
        };

        let added = room.add(conn);
        self.unlock(room_id, &lifecycle, guard);
        Ok(added)
    }

    /// Remove a connection from a room, destroying and unsubscribing it when empty
    ///
    /// Returns false if the connection was not a local member. When the unsubscribe
    /// fails the empty room stays registered and keeps its reference, so a later
    /// join reuses it and the next leave retries.
    pub async fn leave(&self, room_id: RoomId, conn: &Connection) -> PubSubResult<bool> {
        let (lifecycle, guard) = self.lock(room_id).await;

        let Some(room) = self.rooms.get(&room_id).map(|r| r.clone()) else {
            self.unlock(room_id, &lifecycle, guard);
            return Ok(false);
        };

        let removed = room.remove(conn);
        if room.is_empty() {
            if let Err(err) = self.subscriptions.remove(&PubSubChannel::room(room_id)).await {
                self.unlock(room_id, &lifecycle, guard);
                return Err(err);
            }
            self.rooms.remove(&room_id);
            tracing::debug!(room_id = %room_id, "Room destroyed");
        }

        self.unlock(room_id, &lifecycle, guard);
        Ok(removed)
    }

    async fn lock(&self, room_id: RoomId) -> (Lifecycle, OwnedMutexGuard<()>) {
        loop {
            let lifecycle = self.lifecycles.entry(room_id).or_default().clone();
            let guard = lifecycle.clone().lock_owned().await;
            // Dropped from the map while this task waited
            let current = self
                .lifecycles
                .get(&room_id)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &lifecycle));
            if current {
                return (lifecycle, guard);
            }
        }
    }

    /// Release a room's lifecycle lock, forgetting it once the room is gone
    fn unlock(&self, room_id: RoomId, lifecycle: &Lifecycle, guard: OwnedMutexGuard<()>) {
        if !self.rooms.contains_key(&room_id) {
            self.lifecycles
                .remove_if(&room_id, |_, current| Arc::ptr_eq(current, lifecycle));
        }
        drop(guard);
    }

    pub fn get(&self, room_id: RoomId) -> Option<Arc<Room>> {
        self.rooms.get(&room_id).map(|r| r.clone())
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|r| *r.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
