pub mod auth;
pub mod chat;
pub mod middleware;
pub mod rest;
pub mod resume;
pub mod state;

pub use middleware::require_auth;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rest::ApiDoc;

/// Largest accepted request body, sized for résumé uploads.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Builds the complete HTTP application: public and protected API routes,
/// CORS, request tracing, and the Swagger UI.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    // Public routes (no auth required); the stream checks its query token itself.
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/token", post(auth::token_handler))
        .route("/resume/stream/{id}", get(resume::stream_handler));

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route("/resume/upload", post(resume::upload_handler))
        .route("/resume/status/{id}", get(resume::status_handler))
        .route("/chat/completions", post(chat::completions_handler))
        .route("/chat/resume-chats", get(chat::resume_chats_handler))
        .route("/chat/history/{id}", get(chat::history_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}
