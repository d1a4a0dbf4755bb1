//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each
//! variant is rendered as an HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use resume_review_core::ports::PortError;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;
use crate::token::AuthError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bearer token was missing or did not verify.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The client sent something we cannot act on.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while applying the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Auth(e) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Port(port) => match port {
                PortError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
                PortError::NotReady(msg) => {
                    (StatusCode::CONFLICT, "RESUME_NOT_READY", msg.clone())
                }
                PortError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                PortError::Unauthorized => (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Incorrect email or password".to_string(),
                ),
                PortError::Overloaded(msg) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "OVERLOADED", msg.clone())
                }
                PortError::Upstream(msg) => {
                    error!("Upstream service error: {msg}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "UPSTREAM_UNAVAILABLE",
                        "An external service is currently unavailable".to_string(),
                    )
                }
                PortError::Unexpected(msg) => {
                    error!("Unexpected port error: {msg}");
                    internal()
                }
            },
            other => {
                error!("Internal error: {other:?}");
                internal()
            }
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal server error occurred".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));
        (status, body).into_response()
    }
}
