use chrono::{DateTime, Utc};
use diesel::prelude::*;
use mingle_common::UserId;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::chat_messages;
use crate::error::StoreError;

/// Maximum message length, counted in characters.
pub const MAX_CONTENT_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = chat_messages)]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_messages)]
pub struct NewMessage<'a> {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: &'a str,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Row-level rules every stored message satisfies, whichever path created it.
pub fn validate_new_message(
    sender_id: UserId,
    receiver_id: UserId,
    content: &str,
) -> Result<(), StoreError> {
    if sender_id == receiver_id {
        return Err(StoreError::validation("You cannot send a message to yourself."));
    }
    if content.trim().is_empty() {
        return Err(StoreError::validation("Message content cannot be empty."));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(StoreError::validation(
            "Message content cannot exceed 1000 characters.",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<(), StoreError>) -> String {
        match result {
            Err(StoreError::Validation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_self_messages() {
        assert_eq!(
            reason(validate_new_message(1, 1, "hi")),
            "You cannot send a message to yourself."
        );
    }

    #[test]
    fn rejects_blank_content() {
        assert_eq!(
            reason(validate_new_message(1, 2, " \n\t ")),
            "Message content cannot be empty."
        );
    }

    #[test]
    fn length_is_counted_in_characters() {
        let at_limit = "é".repeat(MAX_CONTENT_CHARS);
        assert!(validate_new_message(1, 2, &at_limit).is_ok());

        let over = "é".repeat(MAX_CONTENT_CHARS + 1);
        assert_eq!(
            reason(validate_new_message(1, 2, &over)),
            "Message content cannot exceed 1000 characters."
        );
    }
}
