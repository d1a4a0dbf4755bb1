//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::token::{bearer_token, AuthError};
use crate::web::state::AppState;

/// Middleware that validates the `Authorization: Bearer` token and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let user_id = bearer_token(header_value)
        .and_then(|token| state.tokens.verify(token))
        .map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            e
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
