//! Ingestion: source file -> classify -> map -> batch load
//!
//! Classification and mapping are pure, so they fan out over the rayon pool.
//! Persistence stays serial, one chunk at a time.

use crate::classifier;
use crate::db::RecordStore;
use crate::error::{AgentError, Result};
use crate::loader::{BatchLoader, LoadReport};
use crate::mapper;
use crate::record::{CandidateRecord, RawRecord};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionSummary {
    pub records_read: usize,
    pub records_mapped: usize,
    /// Skipped records keyed by error kind
    pub skipped: BTreeMap<String, usize>,
    pub load: LoadReport,
}

impl IngestionSummary {
    pub fn records_skipped(&self) -> usize {
        self.skipped.values().sum()
    }
}

impl fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records read:      {}", self.records_read)?;
        writeln!(f, "Records mapped:    {}", self.records_mapped)?;
        writeln!(f, "Posts inserted:    {}", self.load.posts_inserted)?;
        writeln!(f, "Comments inserted: {}", self.load.comments_inserted)?;
        writeln!(f, "Already ingested:  {}", self.load.duplicates_skipped)?;
        writeln!(f, "Records skipped:   {}", self.records_skipped())?;
        for (kind, count) in &self.skipped {
            writeln!(f, "  {}: {}", kind, count)?;
        }
        write!(f, "Failed chunks:     {}", self.load.failed_chunks.len())?;
        for failure in &self.load.failed_chunks {
            write!(
                f,
                "\n  chunk {} ({} records): {}",
                failure.chunk_index, failure.records, failure.error
            )?;
        }
        Ok(())
    }
}

/// Read the source export. Anything but a top-level JSON array is a
/// `Source` error.
pub fn read_source(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Source(format!("cannot read {}: {}", path.display(), e)))?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(other) => Err(AgentError::Source(format!(
            "{} must contain a top-level JSON array, found {}",
            path.display(),
            json_type(&other)
        ))),
        Err(e) => Err(AgentError::Source(format!("{} is not valid JSON: {}", path.display(), e))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Classify and map one source value.
pub fn prepare_record(value: Value) -> Result<CandidateRecord> {
    let raw = RawRecord::from_value(value)
        .ok_or_else(|| AgentError::UnclassifiableRecord("record is not a JSON object".to_string()))?;
    let tagged = classifier::tag(raw)?;
    mapper::map_record(&tagged)
}

/// Records that survived classification and mapping, plus skip counts.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub candidates: Vec<CandidateRecord>,
    pub skipped: BTreeMap<String, usize>,
}

/// Classify and map every record in parallel. Source order is preserved.
pub fn prepare_records(values: Vec<Value>) -> PreparedBatch {
    let outcomes: Vec<Result<CandidateRecord>> = values.into_par_iter().map(prepare_record).collect();

    let mut batch = PreparedBatch::default();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(candidate) => batch.candidates.push(candidate),
            Err(e) => {
                warn!(index, kind = e.kind(), error = %e, "skipping record");
                *batch.skipped.entry(e.kind().to_string()).or_insert(0) += 1;
            }
        }
    }
    batch
}

pub struct Ingestor {
    store: Arc<dyn RecordStore>,
    loader: BatchLoader,
}

impl Ingestor {
    pub fn new(store: Arc<dyn RecordStore>, chunk_size: usize) -> Self {
        Self {
            loader: BatchLoader::new(store.clone(), chunk_size),
            store,
        }
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestionSummary> {
        info!("Ingesting {}", path.display());
        let values = read_source(path)?;
        self.ingest_values(values).await
    }

    pub async fn ingest_values(&self, values: Vec<Value>) -> Result<IngestionSummary> {
        self.store.ensure_schema().await?;
        let records_read = values.len();
        let batch = tokio::task::spawn_blocking(move || prepare_records(values))
            .await
            .map_err(|e| AgentError::Execution(format!("record preparation failed: {}", e)))?;

        let load = self.loader.load(&batch.candidates).await;
        let summary = IngestionSummary {
            records_read,
            records_mapped: batch.candidates.len(),
            skipped: batch.skipped,
            load,
        };
        info!(
            read = summary.records_read,
            mapped = summary.records_mapped,
            skipped = summary.records_skipped(),
            failed_chunks = summary.load.failed_chunks.len(),
            "ingestion finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_prepare_counts_skips_by_kind() {
        let batch = prepare_records(vec![
            json!({"asin": "B001", "title": "Widget", "price": "$19.99", "country": "US"}),
            json!({"foo": "bar"}),
            json!("not an object"),
            json!({"subreddit": "rust"}),
            json!({"channel_name": "Rustaceans", "title": "Ownership explained"}),
        ]);
        assert_eq!(batch.candidates.len(), 2);
        assert_eq!(batch.skipped.get("UnclassifiableRecord"), Some(&2));
        assert_eq!(batch.skipped.get("MappingError"), Some(&1));
        assert_eq!(batch.candidates[0].post.asin.as_deref(), Some("B001"));
        assert_eq!(batch.candidates[1].post.channel_name.as_deref(), Some("Rustaceans"));
    }

    #[test]
    fn test_non_array_source_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"records\": []}}").unwrap();
        let err = read_source(file.path()).unwrap_err();
        assert_eq!(err.kind(), "SourceError");
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn test_missing_source_is_rejected() {
        let err = read_source(Path::new("/nonexistent/sample_data.json")).unwrap_err();
        assert_eq!(err.kind(), "SourceError");
    }
}
