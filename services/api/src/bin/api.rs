//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiChatAdapter, VlmParserAdapter},
    config::Config,
    conversation::ConversationService,
    error::ApiError,
    ingest::IngestionPipeline,
    notify::{StatusHub, StatusNotifier},
    token::TokenService,
    web::{build_router, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use resume_review_core::ports::{ChatCompletionService, DatabaseService, DocumentParserService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");
    let db: Arc<dyn DatabaseService> = db_adapter;

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let chat: Arc<dyn ChatCompletionService> = Arc::new(OpenAiChatAdapter::new(
        Client::with_config(openai_config),
        config.chat_model.clone(),
        config.chat_max_tokens,
        config.chat_temperature,
    ));

    let vlm_api_key = config
        .vlm_api_key
        .clone()
        .ok_or_else(|| ApiError::Internal("VLM_API_KEY is required".to_string()))?;
    let parser: Arc<dyn DocumentParserService> = Arc::new(
        VlmParserAdapter::new(vlm_api_key, &config.vlm_base_url)
            .map_err(|e| ApiError::Internal(format!("Failed to build the parser client: {e}")))?,
    );

    // --- 4. Start Background Services & Build the Shared AppState ---
    let hub = StatusHub::new();
    let ingestion =
        IngestionPipeline::start(db.clone(), parser, hub.clone(), config.ingest.clone());
    let notifier = StatusNotifier::new(db.clone(), hub, config.stream_poll_interval);
    let conversations = ConversationService::new(db.clone(), chat);

    let app_state = Arc::new(AppState {
        db,
        config: config.clone(),
        tokens: TokenService::new(config.secret_key.as_bytes()),
        ingestion,
        notifier,
        conversations,
    });

    // --- 5. Create the Web Router ---
    let app = build_router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!("Swagger UI available at http://{}/docs", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
