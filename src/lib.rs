//! Social data agent
//!
//! Loads heterogeneous social-media exports (Amazon reviews, Reddit threads,
//! YouTube comments) into a canonical `posts`/`comments` store and answers
//! natural-language questions over it with model-generated, validated SQL.

pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod explain;
pub mod ingestion;
pub mod llm;
pub mod loader;
pub mod mapper;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod sql_generator;
pub mod sql_validator;
pub mod transform;

pub use config::AgentConfig;
pub use db::{open_store, RecordStore};
pub use error::{AgentError, Result};
pub use ingestion::{IngestionSummary, Ingestor};
pub use llm::{LanguageModel, LlmClient};
pub use pipeline::{Answer, QueryPipeline};
pub use sql_validator::{SqlValidator, ValidatedStatement};
