//! Inbound frame routing: validation, persistence and fan-out.
//!
//! Chat messages are persisted before they are broadcast, so no client ever
//! sees a message that failed to save. Read receipts go the other way round:
//! the receipt is broadcast first and the read flags are updated best-effort.

use std::sync::Arc;

use mingle_common::{RoomName, UserId};

use crate::db::messages::MessageStore;
use crate::db::users::UserDirectory;
use crate::error::StoreError;
use crate::models::message::MAX_CONTENT_CHARS;
use crate::AppState;

use super::frames::{ClientFrame, FrameError, ServerFrame};
use super::session::{ConnectionSession, SetupError};

pub const INTERNAL_ERROR: &str = "Failed to send message";
pub const MESSAGE_REQUIRED: &str = "Message content is required";
pub const MESSAGE_EMPTY: &str = "Message cannot be empty";
pub const MESSAGE_TOO_LONG: &str = "Message is too long (maximum 1000 characters)";
pub const USER_NOT_FOUND: &str = "User not found";
pub const NOT_PARTICIPANTS: &str = "Sender and receiver must be the participants of this room";
pub const NOT_FRIENDS: &str = "You are not friends with this user";

enum RouteError {
    /// Sent back to the client as-is.
    Rejected(String),
    /// Logged; the client only sees `INTERNAL_ERROR`.
    Internal(StoreError),
}

impl From<FrameError> for RouteError {
    fn from(err: FrameError) -> Self {
        Self::Rejected(err.to_string())
    }
}

fn rejected(reason: &str) -> RouteError {
    RouteError::Rejected(reason.to_string())
}

/// Stateless over the shared stores; cheap to build per connection.
pub struct MessageRouter {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    require_friendship: bool,
}

impl MessageRouter {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        require_friendship: bool,
    ) -> Self {
        Self {
            messages,
            users,
            require_friendship,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.messages.clone(),
            state.users.clone(),
            state.config.require_friendship,
        )
    }

    /// Decide whether a connection may enter `room`.
    ///
    /// Without `require_friendship` every valid room name is admitted. With it,
    /// the room must be the canonical room of two existing friends.
    pub async fn admit(&self, room: &RoomName) -> Result<(), SetupError> {
        if !self.require_friendship {
            return Ok(());
        }

        let (a, b) = room
            .participants()
            .ok_or(SetupError::Forbidden("Room is not a conversation between two users"))?;

        for id in [a, b] {
            match self.users.find_user(id).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err(SetupError::Forbidden(USER_NOT_FOUND)),
                Err(error) => {
                    tracing::warn!(%error, room = %room, "user lookup failed during join");
                    return Err(SetupError::Lookup);
                }
            }
        }

        match self.users.are_friends(a, b).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SetupError::Forbidden(NOT_FRIENDS)),
            Err(error) => {
                tracing::warn!(%error, room = %room, "friendship lookup failed during join");
                Err(SetupError::Lookup)
            }
        }
    }

    /// Handle one inbound text frame for `session`.
    ///
    /// Never fails: every problem becomes an `error` frame sent to this
    /// session only, and the session stays joined.
    pub async fn route(&self, session: &ConnectionSession, text: &str) {
        match self.dispatch(session, text).await {
            Ok(()) => {}
            Err(RouteError::Rejected(reason)) => {
                tracing::debug!(connection_id = %session.connection_id(), %reason, "frame rejected");
                session.send(ServerFrame::error(reason));
            }
            Err(RouteError::Internal(error)) => {
                tracing::error!(
                    connection_id = %session.connection_id(),
                    %error,
                    "failed to route frame"
                );
                session.send(ServerFrame::error(INTERNAL_ERROR));
            }
        }
    }

    async fn dispatch(&self, session: &ConnectionSession, text: &str) -> Result<(), RouteError> {
        match ClientFrame::parse(text)? {
            ClientFrame::ReadReceipt { sender, receiver } => {
                self.read_receipt(session, sender, receiver).await
            }
            ClientFrame::ChatMessage {
                sender,
                receiver,
                message,
            } => self.chat_message(session, sender, receiver, message).await,
        }
    }

    fn check_participants(
        &self,
        session: &ConnectionSession,
        sender: UserId,
        receiver: UserId,
    ) -> Result<(), RouteError> {
        if !self.require_friendship {
            return Ok(());
        }
        match session.room() {
            Some(room) if room.is_pair(sender, receiver) => Ok(()),
            _ => Err(rejected(NOT_PARTICIPANTS)),
        }
    }

    async fn read_receipt(
        &self,
        session: &ConnectionSession,
        sender: UserId,
        receiver: UserId,
    ) -> Result<(), RouteError> {
        self.check_participants(session, sender, receiver)?;

        let delivered = session.broadcast(ServerFrame::ReadReceipt { sender, receiver });

        // The receipt is already out; a failed update is only logged.
        match self.messages.mark_read(sender, receiver).await {
            Ok(updated) => {
                tracing::debug!(sender, receiver, updated, delivered, "read receipt applied");
            }
            Err(error) => {
                tracing::warn!(sender, receiver, %error, "failed to persist read receipt");
            }
        }
        Ok(())
    }

    async fn chat_message(
        &self,
        session: &ConnectionSession,
        sender: UserId,
        receiver: UserId,
        message: Option<String>,
    ) -> Result<(), RouteError> {
        self.check_participants(session, sender, receiver)?;

        let message = message.ok_or_else(|| rejected(MESSAGE_REQUIRED))?;
        let content = message.trim();
        if content.is_empty() {
            return Err(rejected(MESSAGE_EMPTY));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(rejected(MESSAGE_TOO_LONG));
        }

        self.resolve_user(sender).await?;
        self.resolve_user(receiver).await?;

        let stored = self
            .messages
            .create_message(sender, receiver, content)
            .await
            .map_err(|err| match err {
                StoreError::Validation(reason) => RouteError::Rejected(reason),
                other => RouteError::Internal(other),
            })?;

        let delivered = session.broadcast(ServerFrame::ChatMessage {
            message: stored.content,
            sender,
            receiver,
        });
        tracing::debug!(message_id = stored.id, sender, receiver, delivered, "chat message stored");
        Ok(())
    }

    async fn resolve_user(&self, id: UserId) -> Result<(), RouteError> {
        match self.users.find_user(id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(rejected(USER_NOT_FOUND)),
            Err(error) => Err(RouteError::Internal(error)),
        }
    }
}
