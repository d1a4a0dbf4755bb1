//! crates/resume_review_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    ChatRole, ChatSummary, ChatTurn, Document, ParseJobStatus, PromptMessage, User,
    UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The item exists but has not reached the state the operation needs.
    #[error("Not ready: {0}")]
    NotReady(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// An external collaborator (parser, chat API) failed or could not be reached.
    #[error("Upstream service unavailable: {0}")]
    Upstream(String),
    #[error("Service overloaded: {0}")]
    Overloaded(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Credential Store ---

    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, email: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    // --- Document Store ---

    /// Inserts a new document in the `processing` state.
    async fn create_document(&self, user_id: Uuid, filename: &str) -> PortResult<Document>;

    /// Fetches a document, treating documents owned by other users as missing.
    async fn get_document_for_user(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Document>;

    /// Moves a `processing` document to `done` with its payload.
    ///
    /// Fails with `Conflict` if the document has already reached a terminal state.
    async fn complete_document(&self, document_id: Uuid, parsed_data: Value) -> PortResult<()>;

    /// Moves a `processing` document to `error`.
    ///
    /// Fails with `Conflict` if the document has already reached a terminal state.
    async fn fail_document(&self, document_id: Uuid, error_message: &str) -> PortResult<()>;

    // --- Chat Log ---

    async fn append_chat_turn(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        role: ChatRole,
        content: &str,
    ) -> PortResult<ChatTurn>;

    /// Returns every turn for the pair, oldest first.
    async fn get_transcript(&self, document_id: Uuid, user_id: Uuid) -> PortResult<Vec<ChatTurn>>;

    /// One entry per owned document with at least one turn, most recent activity first.
    async fn list_chat_summaries(&self, user_id: Uuid) -> PortResult<Vec<ChatSummary>>;
}

#[async_trait]
pub trait DocumentParserService: Send + Sync {
    /// Hands a document to the parser and returns the parser's job handle.
    async fn submit(&self, contents: &[u8], filename: &str, domain: &str) -> PortResult<String>;

    /// Reports the current state of a previously submitted job.
    async fn get_status(&self, job_id: &str) -> PortResult<ParseJobStatus>;
}

#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Produces the next assistant message for the given conversation.
    async fn complete(&self, messages: &[PromptMessage]) -> PortResult<String>;
}
