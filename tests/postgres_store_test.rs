//! PostgreSQL store tests. They need a disposable server and are skipped
//! unless `TEST_DATABASE_URL` points at one.

use serde_json::json;
use social_data_agent::db::{CanonicalSchema, PgStore, RecordStore, SqlDialect};
use social_data_agent::ingestion::prepare_record;
use social_data_agent::SqlValidator;
use std::time::Duration;

async fn connect() -> Option<PgStore> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let store = PgStore::connect(&url).await.unwrap();
    store.ensure_schema().await.unwrap();
    Some(store)
}

/// A reddit thread id no earlier run has used.
fn fresh_id() -> String {
    format!("t3_{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn validator() -> SqlValidator {
    SqlValidator::new(CanonicalSchema::social(), SqlDialect::Postgres)
}

#[tokio::test]
async fn test_duplicate_column_names_are_decoded_by_position() {
    let Some(store) = connect().await else { return };
    let id = fresh_id();
    let candidate = prepare_record(json!({
        "id": id, "subreddit": "rust", "content": "post title",
        "comments": [{"body": "comment text", "author": "ferris", "karma": 3}]
    }))
    .unwrap();
    let outcome = store.persist_chunk(&[candidate]).await.unwrap();
    assert_eq!(outcome.posts_inserted, 1);
    assert_eq!(outcome.comments_inserted, 1);

    let statement = validator()
        .validate(&format!(
            "SELECT p.title AS label, c.content AS label FROM posts p \
             JOIN comments c ON c.post_id = p.id WHERE p.source_key = 'reddit:{}'",
            id
        ))
        .unwrap();
    let result = store.run_read_query(&statement, Duration::from_secs(5)).await.unwrap();

    assert_eq!(result.columns, vec!["label".to_string(), "label".to_string()]);
    assert_eq!(result.rows, vec![vec![json!("post title"), json!("comment text")]]);
}

#[tokio::test]
async fn test_trailing_comments_do_not_break_execution() {
    let Some(store) = connect().await else { return };
    let id = fresh_id();
    let candidate = prepare_record(json!({"id": id, "subreddit": "rust", "content": "counted"})).unwrap();
    store.persist_chunk(&[candidate]).await.unwrap();

    for sql in [
        format!("SELECT COUNT(*) AS n FROM posts WHERE source_key = 'reddit:{}' -- count them", id),
        format!("SELECT COUNT(*) AS n FROM posts WHERE source_key = 'reddit:{}'; -- done", id),
    ] {
        let statement = validator().validate(&sql).unwrap();
        let result = store.run_read_query(&statement, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.rows, vec![vec![json!(1)]], "{}", sql);
    }
}

#[tokio::test]
async fn test_reingested_post_is_skipped() {
    let Some(store) = connect().await else { return };
    let record = json!({"id": fresh_id(), "subreddit": "rust", "content": "only once"});

    let first = store.persist_chunk(&[prepare_record(record.clone()).unwrap()]).await.unwrap();
    let second = store.persist_chunk(&[prepare_record(record).unwrap()]).await.unwrap();

    assert_eq!(first.posts_inserted, 1);
    assert_eq!(second.posts_inserted, 0);
    assert_eq!(second.duplicates_skipped, 1);
}
