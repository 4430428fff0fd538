//! Per-connection session state.
//!
//! A session starts in `Connecting`, moves to `Joined` once its room is
//! admitted and registered, and ends in `Closed`. Leaving the room happens on
//! the way into `Closed`, and again from `Drop`, so the registry entry is
//! released on every exit path including a panicking frame handler.

use std::sync::Arc;

use mingle_common::id::{prefix, prefixed_ulid};
use mingle_common::{RoomName, RoomNameError};
use tokio::sync::mpsc;

use super::frames::ServerFrame;
use super::registry::{Delivery, RoomRegistry, SessionHandle};
use super::router::MessageRouter;

/// Application close codes (4000 range).
pub const CLOSE_SETUP_FAILED: u16 = 4000;
pub const CLOSE_ROOM_FORBIDDEN: u16 = 4003;
pub const CLOSE_IDLE_TIMEOUT: u16 = 4009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Closed,
}

/// Why a connection could not enter its room.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("invalid room name: {0}")]
    InvalidRoom(#[from] RoomNameError),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("room lookup failed")]
    Lookup,
    #[error("session is not connecting")]
    NotConnecting,
}

impl SetupError {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Forbidden(_) => CLOSE_ROOM_FORBIDDEN,
            Self::InvalidRoom(_) | Self::Lookup | Self::NotConnecting => CLOSE_SETUP_FAILED,
        }
    }
}

pub struct ConnectionSession {
    connection_id: String,
    state: SessionState,
    room: Option<RoomName>,
    handle: SessionHandle,
    registry: Arc<RoomRegistry>,
}

impl ConnectionSession {
    /// Create a session in `Connecting` together with the receiving end of its
    /// outbound queue.
    pub fn new(
        registry: Arc<RoomRegistry>,
        outbound_capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<ServerFrame>>) {
        let connection_id = prefixed_ulid(prefix::CONNECTION);
        let (tx, rx) = mpsc::channel(outbound_capacity.max(1));
        let session = Self {
            handle: SessionHandle::new(&connection_id, tx),
            connection_id,
            state: SessionState::Connecting,
            room: None,
            registry,
        };
        (session, rx)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn room(&self) -> Option<&RoomName> {
        self.room.as_ref()
    }

    /// Validate the room name from the connection URL, ask the router whether
    /// the room may be entered, and register with the room.
    ///
    /// Any failure moves the session straight to `Closed`.
    pub async fn join(&mut self, raw_room: &str, router: &MessageRouter) -> Result<(), SetupError> {
        if self.state != SessionState::Connecting {
            return Err(SetupError::NotConnecting);
        }

        let admitted = match RoomName::parse(raw_room) {
            Ok(room) => router.admit(&room).await.map(|()| room),
            Err(err) => Err(err.into()),
        };
        let room = match admitted {
            Ok(room) => room,
            Err(err) => {
                self.state = SessionState::Closed;
                return Err(err);
            }
        };

        if !self.registry.join(&room, self.handle.clone()) {
            tracing::warn!(
                connection_id = %self.connection_id,
                room = %room,
                "session was already registered in its room at join"
            );
        }
        tracing::debug!(
            connection_id = %self.connection_id,
            room = %room,
            members = self.registry.member_count(&room),
            "joined room"
        );
        self.room = Some(room);
        self.state = SessionState::Joined;
        Ok(())
    }

    /// Send a frame to this connection only.
    pub fn send(&self, frame: ServerFrame) {
        if self.handle.deliver(Arc::new(frame)) == Delivery::Gone {
            tracing::debug!(connection_id = %self.connection_id, "unicast to closed connection");
        }
    }

    /// Fan a frame out to everyone in this session's room.
    pub fn broadcast(&self, frame: ServerFrame) -> usize {
        match &self.room {
            Some(room) if self.state == SessionState::Joined => self.registry.broadcast(room, frame),
            _ => 0,
        }
    }

    /// Enter `Closed`, leaving the room if joined. Safe to call repeatedly.
    pub fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        if previous != SessionState::Joined {
            return;
        }
        if let Some(room) = &self.room {
            if !self.registry.leave(room, &self.connection_id) {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    room = %room,
                    "session was not registered in its room at close"
                );
            }
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::messages::MemoryMessageStore;
    use crate::db::users::MemoryUserDirectory;

    fn router(require_friendship: bool) -> (MessageRouter, Arc<MemoryUserDirectory>) {
        let users = Arc::new(MemoryUserDirectory::new());
        let router = MessageRouter::new(
            Arc::new(MemoryMessageStore::new()),
            users.clone(),
            require_friendship,
        );
        (router, users)
    }

    #[tokio::test]
    async fn join_then_close_walks_the_state_machine() {
        let registry = Arc::new(RoomRegistry::new());
        let (router, _) = router(false);
        let (mut session, _rx) = ConnectionSession::new(registry.clone(), 8);
        assert_eq!(session.state(), SessionState::Connecting);

        session.join("1_2", &router).await.unwrap();
        assert_eq!(session.state(), SessionState::Joined);
        assert!(registry.is_member(session.room().unwrap(), session.connection_id()));

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(registry.room_count(), 0);

        // Closed is terminal.
        assert_eq!(session.join("1_2", &router).await, Err(SetupError::NotConnecting));
        session.close();
    }

    #[tokio::test]
    async fn join_tolerates_an_existing_registration() {
        let registry = Arc::new(RoomRegistry::new());
        let (router, _) = router(false);
        let (mut session, _rx) = ConnectionSession::new(registry.clone(), 8);
        let room = RoomName::parse("1_2").unwrap();
        assert!(registry.join(&room, session.handle.clone()));

        session.join("1_2", &router).await.unwrap();
        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(registry.member_count(&room), 1);

        session.close();
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn invalid_room_closes_with_setup_code() {
        let registry = Arc::new(RoomRegistry::new());
        let (router, _) = router(false);
        let (mut session, _rx) = ConnectionSession::new(registry.clone(), 8);

        let err = session.join("no spaces", &router).await.unwrap_err();
        assert_eq!(err.close_code(), CLOSE_SETUP_FAILED);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn forbidden_room_closes_with_forbidden_code() {
        let registry = Arc::new(RoomRegistry::new());
        let (router, users) = router(true);
        users.add_user(1, "ana");
        users.add_user(2, "ben");
        let (mut session, _rx) = ConnectionSession::new(registry.clone(), 8);

        let err = session.join("1_2", &router).await.unwrap_err();
        assert_eq!(err.close_code(), CLOSE_ROOM_FORBIDDEN);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn dropping_a_joined_session_leaves_the_room() {
        let registry = Arc::new(RoomRegistry::new());
        let (router, _) = router(false);
        {
            let (mut session, _rx) = ConnectionSession::new(registry.clone(), 8);
            session.join("lobby", &router).await.unwrap();
            assert_eq!(registry.room_count(), 1);
        }
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn unicast_stays_on_one_connection() {
        let registry = Arc::new(RoomRegistry::new());
        let (router, _) = router(false);
        let (mut a, mut rx_a) = ConnectionSession::new(registry.clone(), 8);
        let (mut b, mut rx_b) = ConnectionSession::new(registry.clone(), 8);
        a.join("1_2", &router).await.unwrap();
        b.join("1_2", &router).await.unwrap();

        a.send(ServerFrame::error("only for a"));
        assert_eq!(*rx_a.try_recv().unwrap(), ServerFrame::error("only for a"));
        assert!(rx_b.try_recv().is_err());
    }
}
