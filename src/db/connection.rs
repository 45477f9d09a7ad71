//! Database connection management using sqlx

use crate::error::{AgentError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Initialize the PostgreSQL connection pool. An unreachable store is a
/// configuration error: nothing downstream can run without it.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| AgentError::Configuration(format!("Failed to connect to PostgreSQL: {}", e)))?;

    // Test the connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AgentError::Configuration(format!("PostgreSQL connection check failed: {}", e)))?;

    Ok(pool)
}
