//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler.

use crate::config::Config;
use crate::conversation::ConversationService;
use crate::ingest::IngestionPipeline;
use crate::notify::StatusNotifier;
use crate::token::TokenService;
use resume_review_core::ports::DatabaseService;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub ingestion: IngestionPipeline,
    pub notifier: StatusNotifier,
    pub conversations: ConversationService,
}
