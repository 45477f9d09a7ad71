//! PostgreSQL store

use crate::db::connection::init_pool;
use crate::db::schema::{create_statements, SqlDialect, INSERT_COMMENT_COLUMNS, INSERT_POST_COLUMNS};
use crate::db::{ChunkOutcome, RecordStore};
use crate::error::{AgentError, Result};
use crate::execution::result::QueryResult;
use crate::record::CandidateRecord;
use crate::sql_validator::ValidatedStatement;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPool;
use sqlx::{Column, Executor, Statement};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = init_pool(database_url).await?;
        info!("Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    fn insert_post_sql() -> String {
        format!(
            "INSERT INTO posts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (source_key) DO NOTHING RETURNING id",
            INSERT_POST_COLUMNS
        )
    }

    fn insert_comment_sql() -> String {
        format!(
            "INSERT INTO comments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            INSERT_COMMENT_COLUMNS
        )
    }
}

fn positional_key(index: usize) -> String {
    format!("c{}", index)
}

fn persist_error(e: sqlx::Error) -> AgentError {
    AgentError::BatchPersist(e.to_string())
}

#[async_trait]
impl RecordStore for PgStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in create_statements(SqlDialect::Postgres) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AgentError::Configuration(format!("Failed to create schema: {}", e)))?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE comments, posts RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::Execution(format!("Failed to reset tables: {}", e)))?;
        Ok(())
    }

    async fn persist_chunk(&self, chunk: &[CandidateRecord]) -> Result<ChunkOutcome> {
        let insert_post = Self::insert_post_sql();
        let insert_comment = Self::insert_comment_sql();
        let mut outcome = ChunkOutcome::default();

        // Dropping the transaction without commit rolls the whole chunk back.
        let mut tx = self.pool.begin().await.map_err(persist_error)?;

        for candidate in chunk {
            let post = &candidate.post;
            let post_id: Option<i64> = sqlx::query_scalar(&insert_post)
                .bind(post.source.as_str())
                .bind(&post.source_key)
                .bind(&post.title)
                .bind(&post.created_at)
                .bind(&post.asin)
                .bind(&post.subreddit)
                .bind(&post.url)
                .bind(&post.description)
                .bind(&post.channel_name)
                .bind(&post.country_of_origin)
                .bind(post.price)
                .bind(&post.currency)
                .bind(&post.star_ratings)
                .bind(post.total_rating)
                .bind(&post.raw_json)
                .fetch_optional(&mut *tx)
                .await
                .map_err(persist_error)?;

            let Some(post_id) = post_id else {
                debug!(source_key = %post.source_key, "post already ingested, skipping");
                outcome.duplicates_skipped += 1;
                continue;
            };
            outcome.posts_inserted += 1;

            for comment in &candidate.comments {
                sqlx::query(&insert_comment)
                    .bind(post_id)
                    .bind(&comment.author_name)
                    .bind(&comment.content)
                    .bind(comment.rating)
                    .bind(comment.helpful_votes)
                    .bind(comment.karma)
                    .bind(&comment.created_at)
                    .bind(&comment.age_group)
                    .bind(&comment.gender)
                    .bind(&comment.income_band)
                    .execute(&mut *tx)
                    .await
                    .map_err(persist_error)?;
                outcome.comments_inserted += 1;
            }
        }

        tx.commit().await.map_err(persist_error)?;
        Ok(outcome)
    }

    async fn run_read_query(&self, statement: &ValidatedStatement, timeout: Duration) -> Result<QueryResult> {
        let started = Instant::now();
        let sql = statement.executable_sql();

        let work = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
            sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;

            let prepared = (&mut *tx).prepare(sql).await?;
            let columns: Vec<String> = prepared.columns().iter().map(|c| c.name().to_string()).collect();

            // row_to_json sidesteps per-type decoding of arbitrary result columns;
            // positional aliases keep duplicate names like p.id, c.id apart.
            let wrapped = if columns.is_empty() {
                format!("SELECT row_to_json(q)::text FROM ({}) AS q", sql)
            } else {
                let aliases: Vec<String> = (0..columns.len()).map(positional_key).collect();
                format!("SELECT row_to_json(q)::text FROM ({}) AS q({})", sql, aliases.join(", "))
            };
            let json_rows: Vec<String> = sqlx::query_scalar(&wrapped).fetch_all(&mut *tx).await?;
            tx.rollback().await?;
            Ok::<_, sqlx::Error>((columns, json_rows))
        };

        let (columns, json_rows) = tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| AgentError::Execution(format!("query timed out after {}s", timeout.as_secs())))?
            .map_err(|e| AgentError::Execution(e.to_string()))?;

        let mut rows = Vec::with_capacity(json_rows.len());
        for text in json_rows {
            let mut object = match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => map,
                other => {
                    return Err(AgentError::Execution(format!("unexpected row shape: {}", other)));
                }
            };
            rows.push(
                (0..columns.len())
                    .map(|i| object.remove(&positional_key(i)).unwrap_or(Value::Null))
                    .collect(),
            );
        }

        Ok(QueryResult::new(
            columns,
            rows,
            "postgres",
            started.elapsed().as_millis() as u64,
        ))
    }
}
