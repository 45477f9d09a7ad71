//! Query Executor - runs validated statements against the store

use crate::db::RecordStore;
use crate::error::Result;
use crate::execution::result::QueryResult;
use crate::sql_validator::ValidatedStatement;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct QueryExecutor {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Execute `statement` once. Failures are returned as-is; nothing here
    /// retries.
    pub async fn execute(&self, statement: &ValidatedStatement) -> Result<QueryResult> {
        match self.store.run_read_query(statement, self.timeout).await {
            Ok(result) => {
                info!(
                    engine = %result.engine_name,
                    rows = result.row_count,
                    elapsed_ms = result.execution_time_ms,
                    "query executed"
                );
                Ok(result)
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "query execution failed");
                Err(e)
            }
        }
    }
}
