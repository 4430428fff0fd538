//! Chat room naming.
//!
//! A direct conversation between two users lives in the room named
//! `"{low}_{high}"`, so both participants derive the same name on their own.

use std::fmt;

use serde::Serialize;

use crate::UserId;

/// Upper bound on the length of a room name taken from a URL.
pub const MAX_ROOM_NAME_LEN: usize = 100;

/// Prefix of the internal fan-out group key.
const GROUP_PREFIX: &str = "chat_";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomNameError {
    #[error("room name is empty")]
    Empty,
    #[error("room name exceeds {MAX_ROOM_NAME_LEN} characters")]
    TooLong,
    #[error("room name contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A validated room name as it appears in the connection URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Validate a raw room name. Only ASCII alphanumerics, `_` and `-` are allowed.
    pub fn parse(raw: &str) -> Result<Self, RoomNameError> {
        if raw.is_empty() {
            return Err(RoomNameError::Empty);
        }
        if raw.len() > MAX_ROOM_NAME_LEN {
            return Err(RoomNameError::TooLong);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(RoomNameError::InvalidCharacter(c));
        }
        Ok(Self(raw.to_string()))
    }

    /// The canonical room for a conversation between `a` and `b`.
    pub fn for_pair(a: UserId, b: UserId) -> Self {
        Self(format!("{}_{}", a.min(b), a.max(b)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the fan-out group that backs this room.
    pub fn group_key(&self) -> String {
        format!("{GROUP_PREFIX}{}", self.0)
    }

    /// The two participants, when this is the canonical name of a direct
    /// conversation between two distinct users.
    pub fn participants(&self) -> Option<(UserId, UserId)> {
        let (low, high) = self.0.split_once('_')?;
        let low: UserId = low.parse().ok()?;
        let high: UserId = high.parse().ok()?;
        if low >= high || Self::for_pair(low, high) != *self {
            return None;
        }
        Some((low, high))
    }

    /// Whether `{a, b}` is exactly this room's participant pair.
    pub fn is_pair(&self, a: UserId, b: UserId) -> bool {
        self.participants() == Some((a.min(b), a.max(b))) && a != b
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
