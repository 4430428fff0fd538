//! Identity and friendship lookups against the web application's tables.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use mingle_common::UserId;
use parking_lot::RwLock;

use crate::db::pool::DbPool;
use crate::db::schema::{auth_user, chat_friendrequest};
use crate::error::StoreError;
use crate::models::user::User;

/// Resolves users and answers whether two users may talk to each other.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up an active user. `Ok(None)` means the user does not exist.
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Whether an accepted friend request links `a` and `b`, in either direction.
    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, StoreError>;

    /// Everyone linked to `user_id` by an accepted friend request, ascending.
    async fn friends(&self, user_id: UserId) -> Result<Vec<UserId>, StoreError>;
}

/// `auth_user` keys are 32-bit. Ids outside that range cannot name a row.
pub(crate) fn row_id(id: UserId) -> Option<i32> {
    i32::try_from(id).ok()
}

pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let Some(id) = row_id(id) else {
            return Ok(None);
        };

        let mut conn = self.pool.get().await?;
        let user = diesel_async::RunQueryDsl::get_result(
            auth_user::table
                .find(id)
                .filter(auth_user::is_active.eq(true))
                .select(User::as_select()),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(user)
    }

    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, StoreError> {
        if a == b {
            return Ok(false);
        }
        let (Some(a), Some(b)) = (row_id(a), row_id(b)) else {
            return Ok(false);
        };

        let mut conn = self.pool.get().await?;
        let accepted: i64 = diesel_async::RunQueryDsl::get_result(
            chat_friendrequest::table
                .filter(chat_friendrequest::is_accepted.eq(true))
                .filter(
                    chat_friendrequest::from_user_id
                        .eq(a)
                        .and(chat_friendrequest::to_user_id.eq(b))
                        .or(chat_friendrequest::from_user_id
                            .eq(b)
                            .and(chat_friendrequest::to_user_id.eq(a))),
                )
                .count(),
            &mut conn,
        )
        .await?;

        Ok(accepted > 0)
    }

    async fn friends(&self, user_id: UserId) -> Result<Vec<UserId>, StoreError> {
        let Some(id) = row_id(user_id) else {
            return Ok(Vec::new());
        };

        let mut conn = self.pool.get().await?;
        let links: Vec<(i32, i32)> = diesel_async::RunQueryDsl::load(
            chat_friendrequest::table
                .filter(chat_friendrequest::is_accepted.eq(true))
                .filter(
                    chat_friendrequest::from_user_id
                        .eq(id)
                        .or(chat_friendrequest::to_user_id.eq(id)),
                )
                .select((chat_friendrequest::from_user_id, chat_friendrequest::to_user_id)),
            &mut conn,
        )
        .await?;

        let mut friends: Vec<UserId> = links
            .into_iter()
            .map(|(from, to)| UserId::from(if from == id { to } else { from }))
            .filter(|&friend| friend != user_id)
            .collect();
        friends.sort_unstable();
        friends.dedup();
        Ok(friends)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and local runs)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
    friendships: RwLock<HashSet<(UserId, UserId)>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: i32, username: &str) {
        self.users.write().insert(
            UserId::from(id),
            User {
                id,
                username: username.to_string(),
            },
        );
    }

    pub fn befriend(&self, a: UserId, b: UserId) {
        self.friendships.write().insert((a.min(b), a.max(b)));
    }

    pub fn unfriend(&self, a: UserId, b: UserId) {
        self.friendships.write().remove(&(a.min(b), a.max(b)));
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, StoreError> {
        Ok(a != b && self.friendships.read().contains(&(a.min(b), a.max(b))))
    }

    async fn friends(&self, user_id: UserId) -> Result<Vec<UserId>, StoreError> {
        let mut friends: Vec<UserId> = self
            .friendships
            .read()
            .iter()
            .filter_map(|&(low, high)| match user_id {
                id if id == low => Some(high),
                id if id == high => Some(low),
                _ => None,
            })
            .collect();
        friends.sort_unstable();
        Ok(friends)
    }
}
