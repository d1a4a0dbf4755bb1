//! services/api/src/web/resume.rs
//!
//! Résumé upload and status endpoints, including the server-sent event stream.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use futures::StreamExt;
use resume_review_core::domain::DocumentStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::token::AuthError;
use crate::web::state::AppState;

const FILE_FIELD: &str = "file";

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ResumeUploadResponse {
    pub resume_id: Uuid,
    #[schema(example = "processing")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ResumeStatusResponse {
    #[schema(example = "done")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub parsed_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Bearer token; event-source clients cannot set headers.
    pub token: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Upload a résumé for background parsing.
///
/// Accepts a multipart/form-data request with a `file` part and returns
/// immediately with the new résumé in the `processing` state.
#[utoipa::path(
    post,
    path = "/resume/upload",
    tag = "resume",
    request_body(
        content_type = "multipart/form-data",
        description = "The résumé file in a `file` part."
    ),
    responses(
        (status = 200, description = "Résumé accepted", body = ResumeUploadResponse),
        (status = 400, description = "Missing or empty file"),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Too many résumés waiting to be parsed")
    ),
    security(("bearer" = []))
)]
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ResumeUploadResponse>, ApiError> {
    let bad_multipart = |e: axum::extract::multipart::MultipartError| {
        ApiError::BadRequest(format!("Failed to read multipart data: {}", e))
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::BadRequest("The file part must have a filename".to_string()))?
            .to_string();
        let contents = field.bytes().await.map_err(bad_multipart)?;
        if contents.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }

        let resume_id = state.ingestion.submit(user_id, &filename, contents).await?;
        info!("Accepted résumé {} ({}) for user {}", resume_id, filename, user_id);

        return Ok(Json(ResumeUploadResponse {
            resume_id,
            status: DocumentStatus::Processing.to_string(),
        }));
    }

    Err(ApiError::BadRequest(
        "Multipart form must include a `file` part".to_string(),
    ))
}

/// Read a résumé's current status.
#[utoipa::path(
    get,
    path = "/resume/status/{id}",
    tag = "resume",
    params(("id" = Uuid, Path, description = "The résumé id")),
    responses(
        (status = 200, description = "Current status", body = ResumeStatusResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Résumé not found")
    ),
    security(("bearer" = []))
)]
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ResumeStatusResponse>, ApiError> {
    let snapshot = state.notifier.poll(resume_id, user_id).await?;
    Ok(Json(ResumeStatusResponse {
        status: snapshot.status.to_string(),
        parsed_data: snapshot.parsed_data,
        error: snapshot.error,
    }))
}

/// Follow a résumé's status as server-sent events.
///
/// Each event's data is a JSON `StatusEvent`. The stream closes after the
/// first `done` or `error` event.
#[utoipa::path(
    get,
    path = "/resume/stream/{id}",
    tag = "resume",
    params(
        ("id" = Uuid, Path, description = "The résumé id"),
        StreamQuery
    ),
    responses(
        (
            status = 200,
            description = "text/event-stream of status events",
            body = crate::notify::StatusEvent
        ),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Résumé not found")
    )
)]
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Path(resume_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let user_id = state.tokens.verify(token)?;

    let events = state
        .notifier
        .stream(resume_id, user_id)
        .await?
        .map(move |item| match item {
            Ok(event) => Event::default().json_data(&event),
            Err(e) => {
                warn!("Status stream for résumé {} failed: {}", resume_id, e);
                Ok(Event::default().event("error").data("Status unavailable"))
            }
        });

    Ok((
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    ))
}
