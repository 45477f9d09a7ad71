//! Query Result - Standardized result format from the store backends

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tabular result of a read-only query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, in select-list order
    pub columns: Vec<String>,

    /// Row values, positionally aligned with `columns`
    pub rows: Vec<Vec<Value>>,

    /// Number of rows returned
    pub row_count: usize,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,

    /// Backend that executed the query
    pub engine_name: String,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, engine_name: &str, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            execution_time_ms,
            engine_name: engine_name.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn records(&self) -> Vec<Value> {
        self.rows.iter().map(|row| self.record(row)).collect()
    }

    /// The first `limit` rows as JSON objects.
    pub fn sample(&self, limit: usize) -> Vec<Value> {
        self.rows.iter().take(limit).map(|row| self.record(row)).collect()
    }

    fn record(&self, row: &[Value]) -> Value {
        let mut object = Map::new();
        for (column, value) in self.columns.iter().zip(row) {
            object.insert(column.clone(), value.clone());
        }
        Value::Object(object)
    }

    /// Pretty JSON rendering used by the CLI.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records())
    }
}
