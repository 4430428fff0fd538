//! Room registry: which live connections belong to which room.
//!
//! Membership lives in a `DashMap` keyed by the room's group key; the shard
//! lock guarding an entry is the room's mutex. Broadcast copies the member
//! handles out under that lock and delivers after releasing it, so a delivery
//! never holds registry state.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use mingle_common::RoomName;
use tokio::sync::mpsc;

use super::frames::ServerFrame;

/// Outcome of handing a frame to one connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The connection's queue is full; the frame was dropped for it.
    Dropped,
    /// The connection has already gone away.
    Gone,
}

/// Sending half of one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    connection_id: Arc<str>,
    tx: mpsc::Sender<Arc<ServerFrame>>,
}

impl SessionHandle {
    pub fn new(connection_id: &str, tx: mpsc::Sender<Arc<ServerFrame>>) -> Self {
        Self {
            connection_id: Arc::from(connection_id),
            tx,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Queue a frame without waiting. A stalled reader only loses its own frames.
    pub fn deliver(&self, frame: Arc<ServerFrame>) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    "outbound queue full, dropping frame"
                );
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Gone,
        }
    }
}

type Members = HashMap<Arc<str>, SessionHandle>;

/// In-memory map of room → joined connections. One per process, owned by
/// `AppState`.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Members>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed.
    /// Returns `false` if the connection was already a member.
    pub fn join(&self, room: &RoomName, handle: SessionHandle) -> bool {
        let mut members = self.rooms.entry(room.group_key()).or_default();
        if members.contains_key(&handle.connection_id) {
            return false;
        }
        members.insert(handle.connection_id.clone(), handle);
        true
    }

    /// Remove a connection from a room. The room entry is dropped once its
    /// last member leaves. Returns `false` if the connection was not a member.
    pub fn leave(&self, room: &RoomName, connection_id: &str) -> bool {
        let key = room.group_key();
        let removed = match self.rooms.get_mut(&key) {
            Some(mut members) => members.remove(connection_id).is_some(),
            None => false,
        };
        // Re-checked under the shard lock, so a concurrent join keeps the room alive.
        self.rooms.remove_if(&key, |_, members| members.is_empty());
        removed
    }

    /// Deliver a frame to every member of a room, the sender's own connection
    /// included. Returns how many members had it queued.
    pub fn broadcast(&self, room: &RoomName, frame: ServerFrame) -> usize {
        let members: Vec<SessionHandle> = match self.rooms.get(&room.group_key()) {
            Some(members) => members.values().cloned().collect(),
            None => return 0,
        };

        let frame = Arc::new(frame);
        members
            .iter()
            .filter(|member| member.deliver(frame.clone()) == Delivery::Queued)
            .count()
    }

    pub fn member_count(&self, room: &RoomName) -> usize {
        self.rooms
            .get(&room.group_key())
            .map(|members| members.len())
            .unwrap_or(0)
    }

    pub fn is_member(&self, room: &RoomName, connection_id: &str) -> bool {
        self.rooms
            .get(&room.group_key())
            .is_some_and(|members| members.contains_key(connection_id))
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
