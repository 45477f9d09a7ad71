//! Relational store
//!
//! [`RecordStore`] is the seam between the pipelines and the database. Two
//! backends implement it: PostgreSQL through sqlx and an embedded SQLite
//! database through rusqlite.

pub mod connection;
pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use connection::init_pool;
pub use postgres::PgStore;
pub use schema::{CanonicalSchema, SqlDialect};
pub use sqlite::SqliteStore;

use crate::config::StoreTarget;
use crate::error::Result;
use crate::execution::result::QueryResult;
use crate::record::CandidateRecord;
use crate::sql_validator::ValidatedStatement;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// What one committed chunk wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub posts_inserted: usize,
    pub comments_inserted: usize,
    /// Posts whose `source_key` was already present; their comments are not written.
    pub duplicates_skipped: usize,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    fn dialect(&self) -> SqlDialect;

    /// Create the canonical tables if they do not exist.
    async fn ensure_schema(&self) -> Result<()>;

    /// Remove all posts and comments and restart identities.
    async fn reset(&self) -> Result<()>;

    /// Persist one chunk atomically: either every post and comment in it is
    /// committed, or nothing is. Failures are `BatchPersist` errors.
    async fn persist_chunk(&self, chunk: &[CandidateRecord]) -> Result<ChunkOutcome>;

    /// Run a validated read-only statement under `timeout`.
    async fn run_read_query(&self, statement: &ValidatedStatement, timeout: Duration) -> Result<QueryResult>;
}

/// Open the store named by the configuration.
pub async fn open_store(target: &StoreTarget) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match target {
        StoreTarget::Postgres(url) => Arc::new(PgStore::connect(url).await?),
        StoreTarget::SqliteFile(path) => Arc::new(SqliteStore::open(path)?),
        StoreTarget::SqliteMemory => Arc::new(SqliteStore::open_in_memory()?),
    };
    Ok(store)
}
