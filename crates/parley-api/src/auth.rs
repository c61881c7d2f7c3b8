//! API authentication via bearer tokens.
//!
//! When `server.api_token` is configured, every `/api/*` request must carry
//! `Authorization: Bearer <token>`. Without a configured token the API is open.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware that validates Bearer token authentication.
///
/// Returns 401 if the header is missing, not valid UTF-8, or carries the
/// wrong token.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(req).await;
    };

    let Some(value) = req.headers().get("authorization") else {
        return ApiError::Unauthorized("Missing Authorization header".to_string()).into_response();
    };

    let Ok(value_str) = value.to_str() else {
        return ApiError::Unauthorized("Invalid Authorization header encoding".to_string())
            .into_response();
    };

    match value_str.strip_prefix("Bearer ") {
        Some(token) if token == expected => next.run(req).await,
        _ => ApiError::Unauthorized("Invalid bearer token".to_string()).into_response(),
    }
}
