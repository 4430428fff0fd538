pub mod conversations;
pub mod health;

use axum::Router;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::USER_ID_HEADER;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", conversations::router())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ID_HEADER))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        conversations::list_conversations,
        conversations::list_messages,
        conversations::mark_as_read,
        conversations::unread_counts,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::models::message::Message,
            crate::db::messages::UnreadCount,
            crate::db::messages::ConversationSummary,
            health::HealthResponse,
            conversations::InboxResponse,
            conversations::ConversationResponse,
            conversations::MarkAsReadResponse,
            conversations::UnreadCountsResponse,
        )
    ),
    modifiers(&SecurityAddon),
    security(("user_id" = [])),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Conversations", description = "Direct message history and read state"),
    )
)]
pub struct ApiDoc;
