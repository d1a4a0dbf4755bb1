//! services/api/src/conversation.rs
//!
//! Chat about a parsed résumé: each question is stored, answered by the chat
//! model with the recent transcript and a digest of the résumé, and the
//! answer is stored after it.

use resume_review_core::{
    domain::{ChatRole, ChatSummary, ChatTurn, Document, DocumentStatus},
    ports::{ChatCompletionService, DatabaseService, PortError, PortResult},
    prompt::build_chat_prompt,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The two turns written by one `ask`, in order.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub document_id: Uuid,
    pub filename: String,
    pub turns: Vec<ChatTurn>,
}

/// A document's full transcript.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    pub document: Document,
    pub turns: Vec<ChatTurn>,
}

impl ChatHistory {
    /// The parsed résumé, only once parsing succeeded.
    pub fn parsed_data(&self) -> Option<&Value> {
        match self.document.status {
            DocumentStatus::Done => self.document.parsed_data.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ConversationService {
    db: Arc<dyn DatabaseService>,
    chat: Arc<dyn ChatCompletionService>,
}

impl ConversationService {
    pub fn new(db: Arc<dyn DatabaseService>, chat: Arc<dyn ChatCompletionService>) -> Self {
        Self { db, chat }
    }

    /// Answers `message` about the user's résumé.
    ///
    /// Fails with `NotFound` for documents the user does not own and with
    /// `NotReady` unless parsing has finished successfully; nothing is written
    /// in either case. If the chat model fails, the user turn stays recorded.
    #[instrument(skip(self, message), fields(message_len = message.len()))]
    pub async fn ask(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        message: &str,
    ) -> PortResult<ChatExchange> {
        let document = self.db.get_document_for_user(document_id, user_id).await?;
        let parsed = match (document.status, document.parsed_data.as_ref()) {
            (DocumentStatus::Done, Some(parsed)) => parsed,
            (status, _) => {
                return Err(PortError::NotReady(format!(
                    "Résumé {} is {}, not ready for chat",
                    document_id, status
                )))
            }
        };

        let user_turn = self
            .db
            .append_chat_turn(document_id, user_id, ChatRole::User, message)
            .await?;

        let mut transcript = self.db.get_transcript(document_id, user_id).await?;
        // Turns stored after ours by concurrent requests stay out of this prompt.
        if let Some(pos) = transcript.iter().position(|turn| turn.id == user_turn.id) {
            transcript.truncate(pos + 1);
        }
        let prompt = build_chat_prompt(&transcript, parsed, message);
        let reply = self.chat.complete(&prompt).await.map_err(|e| {
            warn!("Chat model failed for résumé {}: {}", document_id, e);
            match e {
                PortError::Upstream(_) => e,
                other => PortError::Upstream(other.to_string()),
            }
        })?;

        let assistant_turn = self
            .db
            .append_chat_turn(document_id, user_id, ChatRole::Assistant, &reply)
            .await?;

        info!(
            "Answered question on résumé {} ({} turns in transcript)",
            document_id,
            transcript.len()
        );

        Ok(ChatExchange {
            document_id,
            filename: document.filename,
            turns: vec![user_turn, assistant_turn],
        })
    }

    /// Latest activity per résumé, most recent first.
    pub async fn list_summaries(&self, user_id: Uuid) -> PortResult<Vec<ChatSummary>> {
        self.db.list_chat_summaries(user_id).await
    }

    pub async fn history(&self, document_id: Uuid, user_id: Uuid) -> PortResult<ChatHistory> {
        let document = self.db.get_document_for_user(document_id, user_id).await?;
        let turns = self.db.get_transcript(document_id, user_id).await?;
        Ok(ChatHistory { document, turns })
    }
}
