//! Message persistence: the `MessageStore` trait and its backends.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use mingle_common::{SnowflakeGenerator, UserId};
use parking_lot::Mutex;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::pool::DbPool;
use crate::db::schema::chat_messages;
use crate::error::StoreError;
use crate::models::message::{validate_new_message, Message, NewMessage};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Window into a conversation: the newest `limit` messages older than `before`.
#[derive(Debug, Clone, Copy)]
pub struct HistoryPage {
    pub before: Option<i64>,
    pub limit: i64,
}

impl HistoryPage {
    pub fn new(before: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            before,
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Unread messages addressed to one user, grouped by who sent them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UnreadCount {
    pub sender_id: UserId,
    pub unread_count: i64,
}

/// One friend's entry in a user's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub friend_id: UserId,
    /// Unread messages from the friend to the inbox owner.
    pub unread_count: i64,
    /// Latest message in either direction, if any.
    pub last_message: Option<Message>,
}

/// Most recent conversation first. Friends without any messages come ahead of
/// everyone else, ordered by id.
pub fn sort_inbox(summaries: &mut [ConversationSummary]) {
    fn recency(summary: &ConversationSummary) -> Option<(chrono::DateTime<Utc>, i64)> {
        summary.last_message.as_ref().map(|m| (m.created_at, m.id))
    }

    summaries.sort_by(|a, b| match (recency(a), recency(b)) {
        (None, None) => a.friend_id.cmp(&b.friend_id),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    });
}

/// Storage for chat messages.
///
/// Backed by PostgreSQL in production and an in-memory vector in tests.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Validate and durably store a new unread message with a server-assigned
    /// id and timestamp.
    async fn create_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message, StoreError>;

    /// Flag every unread message from `sender_id` to `receiver_id` as read.
    /// Returns the number of rows that changed.
    async fn mark_read(&self, sender_id: UserId, receiver_id: UserId) -> Result<usize, StoreError>;

    /// Messages exchanged between `a` and `b` in either direction, oldest first.
    async fn conversation(
        &self,
        a: UserId,
        b: UserId,
        page: HistoryPage,
    ) -> Result<Vec<Message>, StoreError>;

    async fn unread_counts(&self, receiver_id: UserId) -> Result<Vec<UnreadCount>, StoreError>;

    /// Unread count and latest message for each of `friends`, sorted with
    /// [`sort_inbox`].
    async fn inbox(
        &self,
        user_id: UserId,
        friends: &[UserId],
    ) -> Result<Vec<ConversationSummary>, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgMessageStore {
    pool: DbPool,
    ids: SnowflakeGenerator,
}

impl PgMessageStore {
    pub fn new(pool: DbPool, worker_id: u16) -> Self {
        Self {
            pool,
            ids: SnowflakeGenerator::new(worker_id),
        }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message, StoreError> {
        validate_new_message(sender_id, receiver_id, content)?;

        let mut conn = self.pool.get().await?;
        let message = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(chat_messages::table)
                .values(NewMessage {
                    id: self.ids.generate(),
                    sender_id,
                    receiver_id,
                    content,
                    created_at: Utc::now(),
                    is_read: false,
                })
                .returning(Message::as_returning()),
            &mut conn,
        )
        .await?;

        Ok(message)
    }

    async fn mark_read(&self, sender_id: UserId, receiver_id: UserId) -> Result<usize, StoreError> {
        let mut conn = self.pool.get().await?;
        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                chat_messages::table
                    .filter(chat_messages::sender_id.eq(sender_id))
                    .filter(chat_messages::receiver_id.eq(receiver_id))
                    .filter(chat_messages::is_read.eq(false)),
            )
            .set(chat_messages::is_read.eq(true)),
            &mut conn,
        )
        .await?;

        Ok(updated)
    }

    async fn conversation(
        &self,
        a: UserId,
        b: UserId,
        page: HistoryPage,
    ) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.pool.get().await?;

        let mut query = chat_messages::table
            .filter(
                chat_messages::sender_id
                    .eq(a)
                    .and(chat_messages::receiver_id.eq(b))
                    .or(chat_messages::sender_id
                        .eq(b)
                        .and(chat_messages::receiver_id.eq(a))),
            )
            .select(Message::as_select())
            .into_boxed();
        if let Some(before) = page.before {
            query = query.filter(chat_messages::id.lt(before));
        }

        let mut messages: Vec<Message> = diesel_async::RunQueryDsl::load(
            query
                .order((chat_messages::created_at.desc(), chat_messages::id.desc()))
                .limit(page.limit),
            &mut conn,
        )
        .await?;
        messages.reverse();

        Ok(messages)
    }

    async fn unread_counts(&self, receiver_id: UserId) -> Result<Vec<UnreadCount>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(UserId, i64)> = diesel_async::RunQueryDsl::load(
            chat_messages::table
                .filter(chat_messages::receiver_id.eq(receiver_id))
                .filter(chat_messages::is_read.eq(false))
                .group_by(chat_messages::sender_id)
                .select((chat_messages::sender_id, diesel::dsl::count_star()))
                .order(chat_messages::sender_id.asc()),
            &mut conn,
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|(sender_id, unread_count)| UnreadCount {
                sender_id,
                unread_count,
            })
            .collect())
    }

    async fn inbox(
        &self,
        user_id: UserId,
        friends: &[UserId],
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        if friends.is_empty() {
            return Ok(Vec::new());
        }

        let unread = self.unread_counts(user_id).await?;
        let mut conn = self.pool.get().await?;

        let mut summaries = Vec::with_capacity(friends.len());
        for &friend_id in friends {
            let last_message: Option<Message> = diesel_async::RunQueryDsl::first(
                chat_messages::table
                    .filter(
                        chat_messages::sender_id
                            .eq(user_id)
                            .and(chat_messages::receiver_id.eq(friend_id))
                            .or(chat_messages::sender_id
                                .eq(friend_id)
                                .and(chat_messages::receiver_id.eq(user_id))),
                    )
                    .order((chat_messages::created_at.desc(), chat_messages::id.desc()))
                    .select(Message::as_select()),
                &mut conn,
            )
            .await
            .optional()?;

            let unread_count = unread
                .iter()
                .find(|c| c.sender_id == friend_id)
                .map_or(0, |c| c.unread_count);

            summaries.push(ConversationSummary {
                friend_id,
                unread_count,
                last_message,
            });
        }

        sort_inbox(&mut summaries);
        Ok(summaries)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and local runs)
// ---------------------------------------------------------------------------

pub struct MemoryMessageStore {
    ids: SnowflakeGenerator,
    rows: Mutex<Vec<Message>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            ids: SnowflakeGenerator::new(0),
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every stored row in insertion order.
    pub fn all(&self) -> Vec<Message> {
        self.rows.lock().clone()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message, StoreError> {
        validate_new_message(sender_id, receiver_id, content)?;

        // Id and timestamp are assigned under the lock so row order matches id order.
        let mut rows = self.rows.lock();
        let message = Message {
            id: self.ids.generate(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at: Utc::now(),
            is_read: false,
        };
        rows.push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, sender_id: UserId, receiver_id: UserId) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock();
        let mut updated = 0;
        for row in rows.iter_mut().filter(|m| {
            m.sender_id == sender_id && m.receiver_id == receiver_id && !m.is_read
        }) {
            row.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn conversation(
        &self,
        a: UserId,
        b: UserId,
        page: HistoryPage,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = self.rows.lock();
        let mut matching: Vec<Message> = rows
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .filter(|m| page.before.map_or(true, |before| m.id < before))
            .cloned()
            .collect();
        matching.sort_by_key(|m| (m.created_at, m.id));

        let skip = matching.len().saturating_sub(page.limit as usize);
        Ok(matching.split_off(skip))
    }

    async fn unread_counts(&self, receiver_id: UserId) -> Result<Vec<UnreadCount>, StoreError> {
        let rows = self.rows.lock();
        let mut counts = std::collections::BTreeMap::<UserId, i64>::new();
        for row in rows
            .iter()
            .filter(|m| m.receiver_id == receiver_id && !m.is_read)
        {
            *counts.entry(row.sender_id).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(sender_id, unread_count)| UnreadCount {
                sender_id,
                unread_count,
            })
            .collect())
    }

    async fn inbox(
        &self,
        user_id: UserId,
        friends: &[UserId],
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut summaries: Vec<ConversationSummary> = {
            let rows = self.rows.lock();
            friends
                .iter()
                .map(|&friend_id| ConversationSummary {
                    friend_id,
                    unread_count: rows
                        .iter()
                        .filter(|m| {
                            m.sender_id == friend_id && m.receiver_id == user_id && !m.is_read
                        })
                        .count() as i64,
                    last_message: rows
                        .iter()
                        .filter(|m| {
                            (m.sender_id == user_id && m.receiver_id == friend_id)
                                || (m.sender_id == friend_id && m.receiver_id == user_id)
                        })
                        .max_by_key(|m| (m.created_at, m.id))
                        .cloned(),
                })
                .collect()
        };

        sort_inbox(&mut summaries);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_assigns_id_timestamp_and_unread() {
        let store = MemoryMessageStore::new();
        let message = store.create_message(1, 2, "hello").await.unwrap();

        assert!(message.id > 0);
        assert_eq!(message.sender_id, 1);
        assert_eq!(message.receiver_id, 2);
        assert_eq!(message.content, "hello");
        assert!(!message.is_read);
        assert_eq!(store.all(), vec![message]);
    }

    #[tokio::test]
    async fn create_rejects_invalid_rows_without_storing() {
        let store = MemoryMessageStore::new();

        let err = store.create_message(1, 1, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = store.create_message(1, 2, "   ").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = store.create_message(1, 2, &"a".repeat(1001)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn mark_read_is_directional_and_idempotent() {
        let store = MemoryMessageStore::new();
        store.create_message(1, 2, "a").await.unwrap();
        store.create_message(1, 2, "b").await.unwrap();
        store.create_message(2, 1, "c").await.unwrap();

        assert_eq!(store.mark_read(1, 2).await.unwrap(), 2);
        assert_eq!(store.mark_read(1, 2).await.unwrap(), 0);

        let unread_for_1 = store.unread_counts(1).await.unwrap();
        assert_eq!(
            unread_for_1,
            vec![UnreadCount {
                sender_id: 2,
                unread_count: 1
            }]
        );
        assert!(store.unread_counts(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversation_is_ordered_and_paged() {
        let store = MemoryMessageStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let (s, r) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
            ids.push(store.create_message(s, r, &format!("m{i}")).await.unwrap().id);
        }
        store.create_message(1, 3, "elsewhere").await.unwrap();

        let all = store.conversation(2, 1, HistoryPage::default()).await.unwrap();
        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4"]);

        let newest_two = store
            .conversation(1, 2, HistoryPage::new(None, Some(2)))
            .await
            .unwrap();
        assert_eq!(newest_two[0].id, ids[3]);
        assert_eq!(newest_two[1].id, ids[4]);

        let older = store
            .conversation(1, 2, HistoryPage::new(Some(ids[3]), Some(2)))
            .await
            .unwrap();
        assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), [ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn inbox_orders_friends_by_latest_message() {
        let store = MemoryMessageStore::new();
        store.create_message(2, 1, "from ben").await.unwrap();
        store.create_message(2, 1, "again").await.unwrap();
        store.create_message(1, 3, "to cid").await.unwrap();
        store.create_message(4, 5, "unrelated").await.unwrap();

        let inbox = store.inbox(1, &[2, 3, 6]).await.unwrap();
        let order: Vec<_> = inbox.iter().map(|s| s.friend_id).collect();
        assert_eq!(order, [6, 3, 2]);

        assert_eq!(inbox[0].unread_count, 0);
        assert!(inbox[0].last_message.is_none());
        assert_eq!(inbox[1].unread_count, 0);
        assert_eq!(inbox[1].last_message.as_ref().unwrap().content, "to cid");
        assert_eq!(inbox[2].unread_count, 2);
        assert_eq!(inbox[2].last_message.as_ref().unwrap().content, "again");

        store.mark_read(2, 1).await.unwrap();
        store.create_message(1, 2, "reply").await.unwrap();
        let inbox = store.inbox(1, &[2, 3]).await.unwrap();
        assert_eq!(inbox[0].friend_id, 2);
        assert_eq!(inbox[0].unread_count, 0);
        assert_eq!(inbox[0].last_message.as_ref().unwrap().content, "reply");
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(HistoryPage::new(None, None).limit, DEFAULT_PAGE_SIZE);
        assert_eq!(HistoryPage::new(None, Some(0)).limit, 1);
        assert_eq!(HistoryPage::new(None, Some(10_000)).limit, MAX_PAGE_SIZE);
    }
}
