//! crates/resume_review_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
}

/// Lifecycle of an uploaded résumé.
///
/// A document starts in `Processing` and moves exactly once to one of the
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentStatus {
    Processing,
    Done,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Done => "done",
            DocumentStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DocumentStatus::Processing)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status or role string is not one we know about.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for DocumentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DocumentStatus::Processing),
            "done" => Ok(DocumentStatus::Done),
            "error" => Ok(DocumentStatus::Error),
            other => Err(UnknownVariant {
                kind: "document status",
                value: other.to_string(),
            }),
        }
    }
}

/// Represents a résumé uploaded by a user.
///
/// `parsed_data` is only ever present when `status` is `Done`, and
/// `error_message` only when it is `Error`.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    pub parsed_data: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(UnknownVariant {
                kind: "chat role",
                value: other.to_string(),
            }),
        }
    }
}

/// A single message in the conversation about one document.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The latest chat activity for one of the user's documents.
#[derive(Debug, Clone)]
pub struct ChatSummary {
    pub document_id: Uuid,
    pub filename: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
}

/// State of a job on the external document parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseJobStatus {
    Pending,
    Completed(Value),
    Failed(String),
}

/// Role of a message sent to the chat-completion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}
