//! In-memory stand-ins for the service ports, shared by the integration tests.
#![allow(dead_code)]

use api_lib::{
    config::{Config, IngestSettings},
    conversation::ConversationService,
    ingest::IngestionPipeline,
    notify::{StatusHub, StatusNotifier},
    token::TokenService,
    web::state::AppState,
};
use async_trait::async_trait;
use chrono::Utc;
use resume_review_core::{
    domain::{
        ChatRole, ChatSummary, ChatTurn, Document, DocumentStatus, ParseJobStatus, PromptMessage,
        User, UserCredentials,
    },
    ports::{
        ChatCompletionService, DatabaseService, DocumentParserService, PortError, PortResult,
    },
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret";

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
struct Tables {
    users: Vec<UserCredentials>,
    documents: HashMap<Uuid, Document>,
    chats: Vec<ChatTurn>,
}

/// Keeps the same ownership and terminal-write rules as the Postgres adapter.
#[derive(Default)]
pub struct InMemoryDb {
    tables: Mutex<Tables>,
    interleaved_turn: Mutex<Option<String>>,
}

impl InMemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next transcript read first appends a user turn with `content`, as if
    /// another request on the same résumé had stored its question just then.
    pub fn interleave_turn_on_next_read(&self, content: &str) {
        *self.interleaved_turn.lock().unwrap() = Some(content.to_string());
    }

    /// Inserts a document directly in the given state.
    pub fn insert_document(
        &self,
        user_id: Uuid,
        filename: &str,
        status: DocumentStatus,
        parsed_data: Option<Value>,
    ) -> Uuid {
        let document = Document {
            id: Uuid::new_v4(),
            user_id,
            filename: filename.to_string(),
            status,
            parsed_data,
            error_message: match status {
                DocumentStatus::Error => Some("Processing error".to_string()),
                _ => None,
            },
            created_at: Utc::now(),
        };
        let id = document.id;
        self.tables.lock().unwrap().documents.insert(id, document);
        id
    }

    pub fn document(&self, id: Uuid) -> Option<Document> {
        self.tables.lock().unwrap().documents.get(&id).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.tables.lock().unwrap().documents.len()
    }

    pub fn chat_count(&self) -> usize {
        self.tables.lock().unwrap().chats.len()
    }

    fn finish(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        parsed_data: Option<Value>,
        error_message: Option<String>,
    ) -> PortResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let document = tables
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| PortError::NotFound(format!("Résumé {} not found", document_id)))?;
        if document.status != DocumentStatus::Processing {
            return Err(PortError::Conflict(format!(
                "Résumé {} is already {}",
                document_id, document.status
            )));
        }
        document.status = status;
        document.parsed_data = parsed_data;
        document.error_message = error_message;
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_user(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.email == email) {
            return Err(PortError::Conflict("Email already registered".to_string()));
        }
        let credentials = UserCredentials {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            is_active: true,
        };
        let user = User {
            user_id: credentials.user_id,
            email: credentials.email.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        tables.users.push(credentials);
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound("User not found".to_string()))
    }

    async fn create_document(&self, user_id: Uuid, filename: &str) -> PortResult<Document> {
        let id = self.insert_document(user_id, filename, DocumentStatus::Processing, None);
        Ok(self.document(id).unwrap())
    }

    async fn get_document_for_user(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Document> {
        self.document(document_id)
            .filter(|d| d.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Résumé {} not found", document_id)))
    }

    async fn complete_document(&self, document_id: Uuid, parsed_data: Value) -> PortResult<()> {
        self.finish(document_id, DocumentStatus::Done, Some(parsed_data), None)
    }

    async fn fail_document(&self, document_id: Uuid, error_message: &str) -> PortResult<()> {
        self.finish(
            document_id,
            DocumentStatus::Error,
            None,
            Some(error_message.to_string()),
        )
    }

    async fn append_chat_turn(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        role: ChatRole,
        content: &str,
    ) -> PortResult<ChatTurn> {
        let turn = ChatTurn {
            id: Uuid::new_v4(),
            document_id,
            user_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().chats.push(turn.clone());
        Ok(turn)
    }

    async fn get_transcript(&self, document_id: Uuid, user_id: Uuid) -> PortResult<Vec<ChatTurn>> {
        let interleaved = self.interleaved_turn.lock().unwrap().take();
        if let Some(content) = interleaved {
            self.append_chat_turn(document_id, user_id, ChatRole::User, &content)
                .await?;
        }
        // Insertion order doubles as the sequence tie-breaker.
        Ok(self
            .tables
            .lock()
            .unwrap()
            .chats
            .iter()
            .filter(|t| t.document_id == document_id && t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_chat_summaries(&self, user_id: Uuid) -> PortResult<Vec<ChatSummary>> {
        let tables = self.tables.lock().unwrap();
        let mut latest: Vec<(usize, ChatSummary)> = Vec::new();
        for (seq, turn) in tables.chats.iter().enumerate() {
            let Some(document) = tables.documents.get(&turn.document_id) else {
                continue;
            };
            if document.user_id != user_id || turn.user_id != user_id {
                continue;
            }
            let summary = ChatSummary {
                document_id: document.id,
                filename: document.filename.clone(),
                last_message: turn.content.clone(),
                last_message_at: turn.created_at,
            };
            match latest.iter_mut().find(|(_, s)| s.document_id == document.id) {
                Some(entry) => *entry = (seq, summary),
                None => latest.push((seq, summary)),
            }
        }
        latest.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(latest.into_iter().map(|(_, s)| s).collect())
    }
}

//=========================================================================================
// Document parser
//=========================================================================================

#[derive(Default)]
struct ParserScript {
    /// What `get_status` reports; `None` means still pending.
    outcome: Option<ParseJobStatus>,
    hang_on_submit: bool,
    panic_on_status: bool,
}

/// A parser whose answers are set by the test.
#[derive(Default)]
pub struct FakeParser {
    script: Mutex<ParserScript>,
    submissions: Mutex<Vec<(String, String)>>,
    polls: AtomicUsize,
}

impl FakeParser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A parser that completes every job with `payload`.
    pub fn completing(payload: Value) -> Arc<Self> {
        let parser = Self::new();
        parser.finish(ParseJobStatus::Completed(payload));
        parser
    }

    /// A parser whose `submit` never returns.
    pub fn hanging() -> Arc<Self> {
        let parser = Self::new();
        parser.script.lock().unwrap().hang_on_submit = true;
        parser
    }

    pub fn panicking() -> Arc<Self> {
        let parser = Self::new();
        parser.script.lock().unwrap().panic_on_status = true;
        parser
    }

    pub fn finish(&self, outcome: ParseJobStatus) {
        self.script.lock().unwrap().outcome = Some(outcome);
    }

    /// (filename, domain) of every submission so far.
    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentParserService for FakeParser {
    async fn submit(&self, _contents: &[u8], filename: &str, domain: &str) -> PortResult<String> {
        let hang = self.script.lock().unwrap().hang_on_submit;
        if hang {
            std::future::pending::<()>().await;
        }
        self.submissions
            .lock()
            .unwrap()
            .push((filename.to_string(), domain.to_string()));
        Ok(format!("pred_{}", Uuid::new_v4()))
    }

    async fn get_status(&self, _job_id: &str) -> PortResult<ParseJobStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let (panic_now, outcome) = {
            let script = self.script.lock().unwrap();
            (script.panic_on_status, script.outcome.clone())
        };
        if panic_now {
            panic!("parser blew up");
        }
        Ok(outcome.unwrap_or(ParseJobStatus::Pending))
    }
}

//=========================================================================================
// Chat model
//=========================================================================================

/// Replies with a fixed answer and records every prompt it was given.
pub struct FakeChat {
    reply: Mutex<Result<String, String>>,
    prompts: Mutex<Vec<Vec<PromptMessage>>>,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(reply.to_string())),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Err(reason.to_string())),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<Vec<PromptMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletionService for FakeChat {
    async fn complete(&self, messages: &[PromptMessage]) -> PortResult<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(PortError::Upstream)
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

/// Worker settings fast enough for tests.
pub fn fast_settings() -> IngestSettings {
    IngestSettings {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        max_concurrent_jobs: 2,
        queue_capacity: 8,
    }
}

pub fn test_config(settings: IngestSettings) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", "postgres://unused".to_string()),
        ("SECRET_KEY", SECRET.to_string()),
        ("STREAM_POLL_INTERVAL_MS", "20".to_string()),
    ]);
    let mut config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
    config.ingest = settings;
    config
}

pub fn build_state(
    db: Arc<InMemoryDb>,
    parser: Arc<FakeParser>,
    chat: Arc<FakeChat>,
    settings: IngestSettings,
) -> Arc<AppState> {
    let config = Arc::new(test_config(settings));
    let db: Arc<dyn DatabaseService> = db;
    let hub = StatusHub::new();

    let ingestion =
        IngestionPipeline::start(db.clone(), parser, hub.clone(), config.ingest.clone());
    let notifier = StatusNotifier::new(db.clone(), hub, config.stream_poll_interval);
    let conversations = ConversationService::new(db.clone(), chat);

    Arc::new(AppState {
        db,
        config: config.clone(),
        tokens: TokenService::new(SECRET.as_bytes()),
        ingestion,
        notifier,
        conversations,
    })
}

/// Polls `check` until it returns true or a few seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..300 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
