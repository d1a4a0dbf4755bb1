//! services/api/src/web/chat.rs
//!
//! Chat endpoints: ask about a résumé, list conversations, read a transcript.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use resume_review_core::domain::ChatTurn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub resume_id: Uuid,
    #[schema(example = "What are my strengths?")]
    pub user_message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatMessage {
    #[schema(example = "assistant")]
    pub message_type: String,
    pub content: String,
}

impl From<ChatTurn> for ChatMessage {
    fn from(turn: ChatTurn) -> Self {
        Self {
            message_type: turn.role.to_string(),
            content: turn.content,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub messages: Vec<ChatMessage>,
    pub resume_id: Uuid,
    pub resume_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct ResumeChatSummary {
    pub resume_id: Uuid,
    pub resume_name: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct ChatHistoryResponse {
    pub resume_id: Uuid,
    pub resume_name: String,
    #[schema(value_type = Option<Object>)]
    pub parsed_data: Option<Value>,
    pub messages: Vec<ChatMessage>,
}

/// Ask the assistant about a parsed résumé.
#[utoipa::path(
    post,
    path = "/chat/completions",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The stored user and assistant turns", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Résumé not found"),
        (status = 409, description = "Résumé is not parsed yet"),
        (status = 502, description = "Chat model unavailable")
    ),
    security(("bearer" = []))
)]
pub async fn completions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.user_message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let exchange = state
        .conversations
        .ask(req.resume_id, user_id, &req.user_message)
        .await?;

    Ok(Json(ChatResponse {
        messages: exchange.turns.into_iter().map(ChatMessage::from).collect(),
        resume_id: exchange.document_id,
        resume_name: exchange.filename,
    }))
}

/// List the user's résumés that have chat activity, most recent first.
#[utoipa::path(
    get,
    path = "/chat/resume-chats",
    tag = "chat",
    responses(
        (status = 200, description = "Latest message per résumé", body = [ResumeChatSummary]),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
pub async fn resume_chats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<ResumeChatSummary>>, ApiError> {
    let summaries = state.conversations.list_summaries(user_id).await?;
    Ok(Json(
        summaries
            .into_iter()
            .map(|s| ResumeChatSummary {
                resume_id: s.document_id,
                resume_name: s.filename,
                last_message: s.last_message,
                last_message_at: s.last_message_at,
            })
            .collect(),
    ))
}

/// Read the full transcript for one résumé.
#[utoipa::path(
    get,
    path = "/chat/history/{id}",
    tag = "chat",
    params(("id" = Uuid, Path, description = "The résumé id")),
    responses(
        (status = 200, description = "Transcript, oldest first", body = ChatHistoryResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Résumé not found")
    ),
    security(("bearer" = []))
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let history = state.conversations.history(resume_id, user_id).await?;
    let parsed_data = history.parsed_data().cloned();

    Ok(Json(ChatHistoryResponse {
        resume_id: history.document.id,
        resume_name: history.document.filename,
        parsed_data,
        messages: history.turns.into_iter().map(ChatMessage::from).collect(),
    }))
}
