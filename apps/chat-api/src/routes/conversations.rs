//! Conversation endpoints: inbox, message history, mark-as-read, unread counts.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use mingle_common::{RoomName, UserId};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthUser;
use crate::db::messages::{ConversationSummary, HistoryPage, UnreadCount};
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::frames::ServerFrame;
use crate::gateway::router::{NOT_FRIENDS, USER_NOT_FOUND};
use crate::models::message::Message;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/{friend_id}/messages", get(list_messages))
        .route("/conversations/{friend_id}/read", put(mark_as_read))
        .route("/messages/unread", get(unread_counts))
}

/// 404 if the friend does not exist, 403 unless the two users are friends.
async fn require_friend(state: &AppState, user_id: UserId, friend_id: UserId) -> Result<(), ApiError> {
    if state.users.find_user(friend_id).await?.is_none() {
        return Err(ApiError::not_found(USER_NOT_FOUND));
    }
    if !state.users.are_friends(user_id, friend_id).await? {
        return Err(ApiError::forbidden(NOT_FRIENDS));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// GET /api/v1/conversations
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct InboxResponse {
    pub data: Vec<ConversationSummary>,
}

#[utoipa::path(
    get,
    path = "/api/v1/conversations",
    tag = "Conversations",
    responses(
        (status = 200, description = "One entry per friend, most recent conversation first", body = InboxResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_conversations(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<InboxResponse>, ApiError> {
    let friends = state.users.friends(user_id).await?;
    let data = state.messages.inbox(user_id, &friends).await?;
    Ok(Json(InboxResponse { data }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/conversations/{friend_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMessagesParams {
    /// Only messages with a smaller id.
    pub before: Option<i64>,
    /// Page size, 1 to 100. Defaults to 50.
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationResponse {
    /// Room to open for live updates (`/ws/chat/{room_name}`).
    #[schema(value_type = String)]
    pub room_name: RoomName,
    pub data: Vec<Message>,
    pub has_more: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/conversations/{friend_id}/messages",
    tag = "Conversations",
    params(
        ("friend_id" = i64, Path, description = "The other participant"),
        ListMessagesParams,
    ),
    responses(
        (status = 200, description = "Messages, oldest first", body = ConversationResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not friends", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn list_messages(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(friend_id): Path<UserId>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<ConversationResponse>, ApiError> {
    require_friend(&state, user_id, friend_id).await?;

    let page = HistoryPage::new(params.before, params.limit);
    // One extra row tells whether anything older exists.
    let lookahead = HistoryPage {
        limit: page.limit + 1,
        ..page
    };
    let mut data = state.messages.conversation(user_id, friend_id, lookahead).await?;

    let has_more = data.len() as i64 > page.limit;
    if has_more {
        data.remove(0);
    }

    Ok(Json(ConversationResponse {
        room_name: RoomName::for_pair(user_id, friend_id),
        data,
        has_more,
    }))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/conversations/{friend_id}/read
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAsReadResponse {
    /// Messages that flipped from unread to read.
    pub updated: usize,
}

#[utoipa::path(
    put,
    path = "/api/v1/conversations/{friend_id}/read",
    tag = "Conversations",
    params(("friend_id" = i64, Path, description = "The other participant")),
    responses(
        (status = 200, description = "Messages from the friend marked as read", body = MarkAsReadResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not friends", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_as_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(friend_id): Path<UserId>,
) -> Result<Json<MarkAsReadResponse>, ApiError> {
    require_friend(&state, user_id, friend_id).await?;

    let updated = state.messages.mark_read(friend_id, user_id).await?;

    // Let an open chat window show the receipt right away.
    let room = RoomName::for_pair(user_id, friend_id);
    state.rooms.broadcast(
        &room,
        ServerFrame::ReadReceipt {
            sender: friend_id,
            receiver: user_id,
        },
    );

    Ok(Json(MarkAsReadResponse { updated }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/messages/unread
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountsResponse {
    pub data: Vec<UnreadCount>,
    pub total: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/unread",
    tag = "Conversations",
    responses(
        (status = 200, description = "Unread messages per sender", body = UnreadCountsResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn unread_counts(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnreadCountsResponse>, ApiError> {
    let data = state.messages.unread_counts(user_id).await?;
    let total = data.iter().map(|c| c.unread_count).sum();
    Ok(Json(UnreadCountsResponse { data, total }))
}
