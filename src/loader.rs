//! Batch Loader
//!
//! Persists mapped candidates in fixed-size chunks, one transaction per
//! chunk. A failed chunk is rolled back by the store, recorded, and the
//! loader moves on to the next one.

use crate::db::{ChunkOutcome, RecordStore};
use crate::record::CandidateRecord;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub records: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub chunks_committed: usize,
    pub posts_inserted: usize,
    pub comments_inserted: usize,
    pub duplicates_skipped: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl LoadReport {
    fn absorb(&mut self, outcome: ChunkOutcome) {
        self.chunks_committed += 1;
        self.posts_inserted += outcome.posts_inserted;
        self.comments_inserted += outcome.comments_inserted;
        self.duplicates_skipped += outcome.duplicates_skipped;
    }

    pub fn records_failed(&self) -> usize {
        self.failed_chunks.iter().map(|f| f.records).sum()
    }
}

pub struct BatchLoader {
    store: Arc<dyn RecordStore>,
    chunk_size: usize,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn RecordStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn load(&self, candidates: &[CandidateRecord]) -> LoadReport {
        let mut report = LoadReport::default();
        for (chunk_index, chunk) in candidates.chunks(self.chunk_size).enumerate() {
            match self.store.persist_chunk(chunk).await {
                Ok(outcome) => {
                    info!(
                        chunk = chunk_index,
                        posts = outcome.posts_inserted,
                        comments = outcome.comments_inserted,
                        duplicates = outcome.duplicates_skipped,
                        "chunk committed"
                    );
                    report.absorb(outcome);
                }
                Err(e) => {
                    error!(chunk = chunk_index, records = chunk.len(), kind = e.kind(), error = %e, "chunk rolled back");
                    report.failed_chunks.push(ChunkFailure {
                        chunk_index,
                        records: chunk.len(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SqlDialect;
    use crate::error::{AgentError, Result};
    use crate::execution::result::QueryResult;
    use crate::record::{NewComment, NewPost, Platform};
    use crate::sql_validator::ValidatedStatement;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Store that rejects any chunk containing a poisoned source key.
    struct ScriptedStore {
        poisoned: &'static str,
        chunk_sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl RecordStore for ScriptedStore {
        fn dialect(&self) -> SqlDialect {
            SqlDialect::Sqlite
        }

        async fn ensure_schema(&self) -> Result<()> {
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            Ok(())
        }

        async fn persist_chunk(&self, chunk: &[CandidateRecord]) -> Result<ChunkOutcome> {
            self.chunk_sizes.lock().unwrap().push(chunk.len());
            if chunk.iter().any(|c| c.post.source_key == self.poisoned) {
                return Err(AgentError::BatchPersist("constraint violated".to_string()));
            }
            Ok(ChunkOutcome {
                posts_inserted: chunk.len(),
                comments_inserted: chunk.iter().map(|c| c.comments.len()).sum(),
                duplicates_skipped: 0,
            })
        }

        async fn run_read_query(&self, _statement: &ValidatedStatement, _timeout: Duration) -> Result<QueryResult> {
            unreachable!("loader never queries")
        }
    }

    fn candidates(n: usize) -> Vec<CandidateRecord> {
        (0..n)
            .map(|i| CandidateRecord {
                post: NewPost::empty(Platform::Reddit, format!("reddit:{}", i), "{}".to_string()),
                comments: vec![NewComment::default()],
            })
            .collect()
    }

    #[tokio::test]
    async fn test_chunks_are_bounded() {
        let store = Arc::new(ScriptedStore {
            poisoned: "none",
            chunk_sizes: Mutex::new(Vec::new()),
        });
        let report = BatchLoader::new(store.clone(), 4).load(&candidates(10)).await;
        assert_eq!(*store.chunk_sizes.lock().unwrap(), vec![4, 4, 2]);
        assert_eq!(report.chunks_committed, 3);
        assert_eq!(report.posts_inserted, 10);
        assert_eq!(report.comments_inserted, 10);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_reported_and_loading_continues() {
        let store = Arc::new(ScriptedStore {
            poisoned: "reddit:5",
            chunk_sizes: Mutex::new(Vec::new()),
        });
        let report = BatchLoader::new(store, 4).load(&candidates(10)).await;
        assert_eq!(report.chunks_committed, 2);
        assert_eq!(report.posts_inserted, 6);
        assert_eq!(report.failed_chunks.len(), 1);
        assert_eq!(report.failed_chunks[0].chunk_index, 1);
        assert_eq!(report.records_failed(), 4);
    }
}
