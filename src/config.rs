//! Process configuration
//!
//! Read once at startup from environment variables (optionally seeded from a
//! `.env` file) and passed by reference into every component afterwards.

use crate::error::{AgentError, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SOURCE_FILE: &str = "sample_data.json";

/// Where ingested records are persisted and queried.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreTarget {
    Postgres(String),
    SqliteFile(PathBuf),
    SqliteMemory,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: usize,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub llm: LlmSettings,
    pub store: StoreTarget,
    pub source_file: PathBuf,
    pub chunk_size: usize,
    pub query_timeout: Duration,
    pub explanation_sample_rows: usize,
}

impl AgentConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or_else(|| {
            AgentError::Configuration("OPENAI_API_KEY is not set".to_string())
        })?;

        let llm = LlmSettings {
            api_key,
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: parse_timeout(&get, "LLM_TIMEOUT_SECS", 30)?,
            max_attempts: parse_number(&get, "LLM_MAX_ATTEMPTS", 3)?.max(1) as usize,
        };

        let store = match get("DATABASE_URL") {
            Some(url) => store_target_from_url(&url),
            None => StoreTarget::Postgres(postgres_url_from_parts(&get)?),
        };

        let chunk_size = parse_number(&get, "INGEST_CHUNK_SIZE", 500)? as usize;
        if chunk_size == 0 {
            return Err(AgentError::Configuration(
                "INGEST_CHUNK_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            llm,
            store,
            source_file: PathBuf::from(
                get("SOURCE_FILE").unwrap_or_else(|| DEFAULT_SOURCE_FILE.to_string()),
            ),
            chunk_size,
            query_timeout: parse_timeout(&get, "QUERY_TIMEOUT_SECS", 30)?,
            explanation_sample_rows: parse_number(&get, "EXPLANATION_SAMPLE_ROWS", 20)? as usize,
        })
    }
}

fn store_target_from_url(url: &str) -> StoreTarget {
    if url == "sqlite::memory:" || url == "sqlite://:memory:" {
        return StoreTarget::SqliteMemory;
    }
    match url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) {
        Some(path) => StoreTarget::SqliteFile(PathBuf::from(path)),
        None => StoreTarget::Postgres(url.to_string()),
    }
}

/// Assemble a PostgreSQL URL from the individual `PG_*` variables.
fn postgres_url_from_parts<G>(get: &G) -> Result<String>
where
    G: Fn(&str) -> Option<String>,
{
    let require = |key: &str| {
        get(key).ok_or_else(|| {
            AgentError::Configuration(format!("DATABASE_URL is not set and {} is missing", key))
        })
    };
    let host = require("PG_HOST")?;
    let database = require("PG_DATABASE")?;
    let user = require("PG_USER")?;
    let port = get("PG_PORT").unwrap_or_else(|| "5432".to_string());

    Ok(match get("PG_PASSWORD") {
        Some(password) => format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, database),
        None => format!("postgres://{}@{}:{}/{}", user, host, port, database),
    })
}

fn parse_number<G>(get: &G, key: &str, default: u64) -> Result<u64>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            AgentError::Configuration(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
    }
}

/// A timeout in whole seconds. Zero is refused: tokio would fail every call
/// at once while Postgres reads `statement_timeout = 0` as no limit.
fn parse_timeout<G>(get: &G, key: &str, default: u64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_number(get, key, default)? {
        0 => Err(AgentError::Configuration(format!("{} must be at least 1", key))),
        secs => Ok(Duration::from_secs(secs)),
    }
}
