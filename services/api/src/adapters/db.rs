//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resume_review_core::domain::{
    ChatRole, ChatSummary, ChatTurn, Document, DocumentStatus, User, UserCredentials,
};
use resume_review_core::ports::{DatabaseService, PortError, PortResult};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Tells apart "no such document" from "already finalized" after a
    /// conditional terminal write touched no rows.
    async fn explain_missed_transition(&self, document_id: Uuid) -> PortError {
        let status: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM resumes WHERE id = $1")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await;

        match status {
            Ok(Some(status)) => PortError::Conflict(format!(
                "Résumé {} is already {}",
                document_id, status
            )),
            Ok(None) => PortError::NotFound(format!("Résumé {} not found", document_id)),
            Err(e) => unexpected(e),
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.id,
            email: self.email,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
    is_active: bool,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
            is_active: self.is_active,
        }
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    user_id: Uuid,
    filename: String,
    status: String,
    parsed_data: Option<Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> PortResult<Document> {
        let status: DocumentStatus = self
            .status
            .parse()
            .map_err(|e| PortError::Unexpected(format!("{e}")))?;
        Ok(Document {
            id: self.id,
            user_id: self.user_id,
            filename: self.filename,
            status,
            parsed_data: self.parsed_data,
            error_message: self.error_message,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    resume_id: Uuid,
    user_id: Uuid,
    message_type: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self) -> PortResult<ChatTurn> {
        let role: ChatRole = self
            .message_type
            .parse()
            .map_err(|e| PortError::Unexpected(format!("{e}")))?;
        Ok(ChatTurn {
            id: self.id,
            document_id: self.resume_id,
            user_id: self.user_id,
            role,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ChatSummaryRecord {
    resume_id: Uuid,
    filename: String,
    last_message: String,
    last_message_at: DateTime<Utc>,
}
impl ChatSummaryRecord {
    fn to_domain(self) -> ChatSummary {
        ChatSummary {
            document_id: self.resume_id,
            filename: self.filename,
            last_message: self.last_message,
            last_message_at: self.last_message_at,
        }
    }
}

const DOCUMENT_COLUMNS: &str =
    "id, user_id, filename, status, parsed_data, error_message, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING id, email, is_active, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict("Email already registered".to_string())
            } else {
                unexpected(e)
            }
        })?;

        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password, is_active FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("User not found".to_string()),
            _ => unexpected(e),
        })?;

        Ok(record.to_domain())
    }

    async fn create_document(&self, user_id: Uuid, filename: &str) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "INSERT INTO resumes (id, user_id, filename, status) VALUES ($1, $2, $3, 'processing') \
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(filename)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn get_document_for_user(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM resumes WHERE id = $1 AND user_id = $2"
        ))
        .bind(document_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Résumé {} not found", document_id))
            }
            _ => unexpected(e),
        })?;

        record.to_domain()
    }

    async fn complete_document(&self, document_id: Uuid, parsed_data: Value) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE resumes SET status = 'done', parsed_data = $2 \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(document_id)
        .bind(parsed_data)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_transition(document_id).await);
        }
        Ok(())
    }

    async fn fail_document(&self, document_id: Uuid, error_message: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE resumes SET status = 'error', error_message = $2 \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(document_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_transition(document_id).await);
        }
        Ok(())
    }

    async fn append_chat_turn(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        role: ChatRole,
        content: &str,
    ) -> PortResult<ChatTurn> {
        let record = sqlx::query_as::<_, ChatRecord>(
            "INSERT INTO chats (id, resume_id, user_id, message_type, content) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, resume_id, user_id, message_type, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn get_transcript(&self, document_id: Uuid, user_id: Uuid) -> PortResult<Vec<ChatTurn>> {
        let records = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, resume_id, user_id, message_type, content, created_at FROM chats \
             WHERE resume_id = $1 AND user_id = $2 ORDER BY created_at ASC, seq ASC",
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(ChatRecord::to_domain).collect()
    }

    async fn list_chat_summaries(&self, user_id: Uuid) -> PortResult<Vec<ChatSummary>> {
        let records = sqlx::query_as::<_, ChatSummaryRecord>(
            "SELECT resume_id, filename, last_message, last_message_at FROM ( \
                 SELECT DISTINCT ON (c.resume_id) \
                        c.resume_id, r.filename, \
                        c.content AS last_message, c.created_at AS last_message_at \
                 FROM chats c \
                 JOIN resumes r ON r.id = c.resume_id \
                 WHERE r.user_id = $1 AND c.user_id = $1 \
                 ORDER BY c.resume_id, c.created_at DESC, c.seq DESC \
             ) latest \
             ORDER BY last_message_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(ChatSummaryRecord::to_domain).collect())
    }
}
