use async_trait::async_trait;
use serde_json::json;
use social_data_agent::config::AgentConfig;
use social_data_agent::db::schema::CanonicalSchema;
use social_data_agent::db::{open_store, RecordStore};
use social_data_agent::execution::QueryExecutor;
use social_data_agent::explain::ExplanationGenerator;
use social_data_agent::llm::{CompletionRequest, LanguageModel};
use social_data_agent::retry::RetryPolicy;
use social_data_agent::sql_generator::SqlGenerator;
use social_data_agent::{AgentError, Ingestor, QueryPipeline, Result, SqlValidator};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Language model that replays canned replies and records what it was asked.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn prompt(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].prompt.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Generation("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn test_config() -> AgentConfig {
    let vars: HashMap<&str, &str> = [
        ("OPENAI_API_KEY", "sk-test"),
        ("DATABASE_URL", "sqlite::memory:"),
        ("EXPLANATION_SAMPLE_ROWS", "5"),
    ]
    .into_iter()
    .collect();
    AgentConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

async fn seeded_store(config: &AgentConfig) -> Arc<dyn RecordStore> {
    let store = open_store(&config.store).await.unwrap();
    let records = vec![
        json!({"id": "r1", "subreddit": "rust", "content": "Borrow checker tips", "created_at": "2024-05-01",
               "comments": [{"body": "use clones sparingly", "author": "ferris", "karma": 10}]}),
        json!({"id": "r2", "subreddit": "cooking", "content": "Cast iron care", "created_at": "2024-05-02"}),
        json!({"asin": "B001", "title": "Widget", "price": "$19.99", "country": "US"}),
        json!({"video_id": "v1", "title": "Async Rust", "channel_name": "Code Academy"}),
    ];
    Ingestor::new(store.clone(), 500).ingest_values(records).await.unwrap();
    store
}

#[tokio::test]
async fn test_count_question_end_to_end() {
    let config = test_config();
    let store = seeded_store(&config).await;
    let model = ScriptedModel::new(vec![
        Ok("```sql\nSELECT COUNT(*) AS reddit_posts FROM posts WHERE source = 'reddit';\n```".to_string()),
        Ok("There are 2 posts from reddit.".to_string()),
    ]);
    let pipeline = QueryPipeline::from_config(&config, model.clone(), store);

    let answer = pipeline.answer("How many posts come from reddit?").await.unwrap();

    assert_eq!(
        answer.sql.as_str(),
        "SELECT COUNT(*) AS reddit_posts FROM posts WHERE source = 'reddit';"
    );
    assert_eq!(answer.result.columns, vec!["reddit_posts".to_string()]);
    assert_eq!(answer.result.rows, vec![vec![json!(2)]]);
    assert!(answer.explanation.contains('2'));

    // Generation saw the schema; explanation saw the question, SQL and rows.
    assert_eq!(model.calls(), 2);
    assert!(model.prompt(0).contains("TABLE posts:"));
    assert!(model.prompt(0).contains("SQLite"));
    let explanation_prompt = model.prompt(1);
    assert!(explanation_prompt.contains("How many posts come from reddit?"));
    assert!(explanation_prompt.contains("\"reddit_posts\": 2"));
}

#[tokio::test]
async fn test_destructive_sql_is_never_executed() {
    let config = test_config();
    let store = seeded_store(&config).await;
    let model = ScriptedModel::new(vec![Ok("DROP TABLE posts".to_string())]);
    let pipeline = QueryPipeline::from_config(&config, model.clone(), store.clone());

    let err = pipeline.answer("Delete everything").await.unwrap_err();
    assert_eq!(err.kind(), "UnsafeQueryError");
    assert_eq!(model.calls(), 1);

    // posts is untouched
    let check = SqlValidator::new(CanonicalSchema::social(), store.dialect())
        .validate("SELECT COUNT(*) FROM posts")
        .unwrap();
    let result = store.run_read_query(&check, Duration::from_secs(5)).await.unwrap();
    assert_eq!(result.rows, vec![vec![json!(4)]]);
}

#[tokio::test]
async fn test_second_statement_is_rejected() {
    let config = test_config();
    let store = seeded_store(&config).await;
    let model = ScriptedModel::new(vec![Ok(
        "SELECT title FROM posts; DELETE FROM comments".to_string()
    )]);
    let pipeline = QueryPipeline::from_config(&config, model, store);

    let err = pipeline.answer("titles").await.unwrap_err();
    assert_eq!(err.kind(), "UnsafeQueryError");
}

#[tokio::test]
async fn test_unknown_table_is_rejected() {
    let config = test_config();
    let store = seeded_store(&config).await;
    let model = ScriptedModel::new(vec![Ok("SELECT name FROM users".to_string())]);
    let pipeline = QueryPipeline::from_config(&config, model, store);

    let err = pipeline.answer("Who are the users?").await.unwrap_err();
    assert_eq!(err.kind(), "UnknownSchemaReferenceError");
}

#[tokio::test]
async fn test_generation_failure_after_retries() {
    let config = test_config();
    let store = seeded_store(&config).await;
    let model = ScriptedModel::new(vec![
        Err(AgentError::Generation("503".to_string())),
        Ok(String::new()),
        Err(AgentError::Generation("timeout".to_string())),
    ]);
    let schema = CanonicalSchema::social();
    let pipeline = QueryPipeline::new(
        SqlGenerator::new(model.clone(), &schema, store.dialect(), RetryPolicy::immediate(3)),
        SqlValidator::new(schema, store.dialect()),
        QueryExecutor::new(store, Duration::from_secs(5)),
        ExplanationGenerator::new(model.clone(), RetryPolicy::immediate(3), 5),
    );

    let err = pipeline.answer("anything").await.unwrap_err();
    assert_eq!(err.kind(), "GenerationError");
    assert_eq!(model.calls(), 3);
}

#[tokio::test]
async fn test_join_question_with_aliases() {
    let config = test_config();
    let store = seeded_store(&config).await;
    let model = ScriptedModel::new(vec![
        Ok("SELECT p.subreddit, SUM(c.karma) AS total_karma FROM posts p \
            JOIN comments c ON c.post_id = p.id WHERE p.source = 'reddit' \
            GROUP BY p.subreddit ORDER BY total_karma DESC"
            .to_string()),
        Ok("Only r/rust has comments, with 10 karma in total.".to_string()),
    ]);
    let pipeline = QueryPipeline::from_config(&config, model, store);

    let answer = pipeline.answer("Which subreddit has the most comment karma?").await.unwrap();
    assert_eq!(answer.result.rows, vec![vec![json!("rust"), json!(10)]]);
}

#[tokio::test]
async fn test_reads_outside_the_schema_are_rejected() {
    let config = test_config();
    let store = seeded_store(&config).await;

    for (sql, kind) in [
        ("SELECT title FROM posts UNION TABLE sqlite_master", "UnknownSchemaReferenceError"),
        ("SELECT * FROM posts, LATERAL readfile('/etc/passwd') AS f", "UnsafeQueryError"),
        ("SELECT karma FROM posts", "UnknownSchemaReferenceError"),
    ] {
        let model = ScriptedModel::new(vec![Ok(sql.to_string())]);
        let pipeline = QueryPipeline::from_config(&config, model, store.clone());
        let err = pipeline.answer("show me everything").await.unwrap_err();
        assert_eq!(err.kind(), kind, "{}", sql);
    }
}

#[tokio::test]
async fn test_trailing_comment_in_generated_sql() {
    let config = test_config();
    let store = seeded_store(&config).await;
    let model = ScriptedModel::new(vec![
        Ok("SELECT COUNT(*) AS total FROM posts; -- every platform".to_string()),
        Ok("There are 4 posts.".to_string()),
    ]);
    let pipeline = QueryPipeline::from_config(&config, model, store);

    let answer = pipeline.answer("How many posts are there?").await.unwrap();
    assert_eq!(answer.result.rows, vec![vec![json!(4)]]);
}
