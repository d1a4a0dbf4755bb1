//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub secret_key: String,
    pub access_token_ttl: chrono::Duration,
    pub cors_allowed_origins: Vec<String>,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub chat_max_tokens: u32,
    pub chat_temperature: f32,
    pub vlm_api_key: Option<String>,
    pub vlm_base_url: String,
    pub ingest: IngestSettings,
    pub stream_poll_interval: Duration,
}

/// Tuning knobs for the background parsing workers.
#[derive(Clone, Debug)]
pub struct IngestSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
            max_concurrent_jobs: 4,
            queue_capacity: 64,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:8000".parse().ok())?;
        let database_url = required(&lookup, "DATABASE_URL")?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(5))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Auth Settings ---
        let secret_key = required(&lookup, "SECRET_KEY")?;
        let ttl_minutes: i64 = parse_or(&lookup, "ACCESS_TOKEN_EXPIRE_MINUTES", Some(60))?;
        if ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "ACCESS_TOKEN_EXPIRE_MINUTES".to_string(),
                "must be a positive number of minutes".to_string(),
            ));
        }

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        // --- Load API Keys (as optional) ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let vlm_api_key = lookup("VLM_API_KEY");

        // --- Load Adapter-specific Settings ---
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4".to_string());
        let chat_max_tokens = parse_or(&lookup, "CHAT_MAX_TOKENS", Some(600))?;
        let chat_temperature = parse_or(&lookup, "CHAT_TEMPERATURE", Some(0.7))?;
        let vlm_base_url = lookup("VLM_BASE_URL")
            .unwrap_or_else(|| "https://api.vlm.run/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        // --- Load Worker Settings ---
        let defaults = IngestSettings::default();
        let ingest = IngestSettings {
            poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "PARSE_POLL_INTERVAL_SECS",
                Some(defaults.poll_interval.as_secs()),
            )?),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "PARSE_TIMEOUT_SECS",
                Some(defaults.timeout.as_secs()),
            )?),
            max_concurrent_jobs: positive(
                "INGEST_MAX_CONCURRENT",
                parse_or(&lookup, "INGEST_MAX_CONCURRENT", Some(defaults.max_concurrent_jobs))?,
            )?,
            queue_capacity: positive(
                "INGEST_QUEUE_CAPACITY",
                parse_or(&lookup, "INGEST_QUEUE_CAPACITY", Some(defaults.queue_capacity))?,
            )?,
        };
        let stream_poll_interval =
            Duration::from_millis(parse_or(&lookup, "STREAM_POLL_INTERVAL_MS", Some(1000))?);

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            secret_key,
            access_token_ttl: chrono::Duration::minutes(ttl_minutes),
            cors_allowed_origins,
            openai_api_key,
            chat_model,
            chat_max_tokens,
            chat_temperature,
            vlm_api_key,
            vlm_base_url,
            ingest,
            stream_poll_interval,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

fn positive(key: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}
