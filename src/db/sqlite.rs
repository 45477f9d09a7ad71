//! Embedded SQLite store
//!
//! Used for local runs and tests. rusqlite is synchronous, so every call runs
//! on the blocking pool; a query that overruns its timeout is interrupted.

use crate::db::schema::{create_statements, SqlDialect, INSERT_COMMENT_COLUMNS, INSERT_POST_COLUMNS};
use crate::db::{ChunkOutcome, RecordStore};
use crate::error::{AgentError, Result};
use crate::execution::result::QueryResult;
use crate::record::CandidateRecord;
use crate::sql_validator::ValidatedStatement;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            AgentError::Configuration(format!("Failed to open SQLite database {}: {}", path.display(), e))
        })?;
        info!("Opened SQLite database at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AgentError::Configuration(format!("Failed to open in-memory SQLite: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| AgentError::Configuration(format!("Failed to enable foreign keys: {}", e)))?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    /// Run `work` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AgentError::Execution("SQLite connection lock poisoned".to_string()))?;
            work(&mut guard)
        })
        .await
        .map_err(|e| AgentError::Execution(format!("SQLite task failed: {}", e)))?
    }
}

fn persist_error(e: rusqlite::Error) -> AgentError {
    AgentError::BatchPersist(e.to_string())
}

fn execution_error(e: rusqlite::Error) -> AgentError {
    AgentError::Execution(e.to_string())
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

fn insert_chunk(conn: &mut Connection, chunk: &[CandidateRecord]) -> rusqlite::Result<ChunkOutcome> {
    let insert_post = format!(
        "INSERT INTO posts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
         ON CONFLICT (source_key) DO NOTHING RETURNING id",
        INSERT_POST_COLUMNS
    );
    let insert_comment = format!(
        "INSERT INTO comments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        INSERT_COMMENT_COLUMNS
    );
    let mut outcome = ChunkOutcome::default();

    // Rolls back on drop unless committed.
    let tx = conn.transaction()?;
    {
        let mut post_stmt = tx.prepare_cached(&insert_post)?;
        let mut comment_stmt = tx.prepare_cached(&insert_comment)?;

        for candidate in chunk {
            let post = &candidate.post;
            let post_id: Option<i64> = post_stmt
                .query_row(
                    params![
                        post.source.as_str(),
                        post.source_key,
                        post.title,
                        post.created_at,
                        post.asin,
                        post.subreddit,
                        post.url,
                        post.description,
                        post.channel_name,
                        post.country_of_origin,
                        post.price,
                        post.currency,
                        post.star_ratings,
                        post.total_rating,
                        post.raw_json,
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(post_id) = post_id else {
                debug!(source_key = %post.source_key, "post already ingested, skipping");
                outcome.duplicates_skipped += 1;
                continue;
            };
            outcome.posts_inserted += 1;

            for comment in &candidate.comments {
                comment_stmt.execute(params![
                    post_id,
                    comment.author_name,
                    comment.content,
                    comment.rating,
                    comment.helpful_votes,
                    comment.karma,
                    comment.created_at,
                    comment.age_group,
                    comment.gender,
                    comment.income_band,
                ])?;
                outcome.comments_inserted += 1;
            }
        }
    }
    tx.commit()?;
    Ok(outcome)
}

fn read_query(conn: &Connection, sql: &str) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let mut stmt = conn.prepare(sql).map_err(execution_error)?;
    if !stmt.readonly() {
        return Err(AgentError::UnsafeQuery("statement would modify the database".to_string()));
    }
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([]).map_err(execution_error)?;
    while let Some(row) = cursor.next().map_err(execution_error)? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(json_value(row.get_ref(i).map_err(execution_error)?));
        }
        rows.push(values);
    }
    Ok((columns, rows))
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            for statement in create_statements(SqlDialect::Sqlite) {
                conn.execute_batch(statement)
                    .map_err(|e| AgentError::Configuration(format!("Failed to create schema: {}", e)))?;
            }
            Ok(())
        })
        .await
    }

    async fn reset(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 DELETE FROM comments;
                 DELETE FROM posts;
                 DELETE FROM sqlite_sequence WHERE name IN ('posts', 'comments');
                 COMMIT;",
            )
            .map_err(|e| AgentError::Execution(format!("Failed to reset tables: {}", e)))
        })
        .await
    }

    async fn persist_chunk(&self, chunk: &[CandidateRecord]) -> Result<ChunkOutcome> {
        let chunk = chunk.to_vec();
        self.with_connection(move |conn| insert_chunk(conn, &chunk).map_err(persist_error))
            .await
    }

    async fn run_read_query(&self, statement: &ValidatedStatement, timeout: Duration) -> Result<QueryResult> {
        let started = Instant::now();
        let sql = statement.executable_sql().to_string();
        let work = self.with_connection(move |conn| read_query(conn, &sql));

        match tokio::time::timeout(timeout, work).await {
            Ok(outcome) => {
                let (columns, rows) = outcome?;
                Ok(QueryResult::new(
                    columns,
                    rows,
                    "sqlite",
                    started.elapsed().as_millis() as u64,
                ))
            }
            Err(_) => {
                warn!("query exceeded {}s, interrupting", timeout.as_secs());
                self.interrupt.interrupt();
                Err(AgentError::Execution(format!(
                    "query timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }
}
