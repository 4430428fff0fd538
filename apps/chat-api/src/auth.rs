//! Caller identity for the HTTP API.
//!
//! Sessions and cookies are handled by the web application in front of this
//! service; it forwards the signed-in user's id in `X-User-Id`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use mingle_common::UserId;

use crate::error::ApiError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user extracted from the `X-User-Id` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// Rejection returned when the identity header is missing or malformed.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::unauthorized(self.message).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError {
                message: "Missing X-User-Id header",
            })?;

        let user_id = header.trim().parse().map_err(|_| AuthError {
            message: "Invalid X-User-Id header",
        })?;

        Ok(AuthUser { user_id })
    }
}
