//! SQL Generator - natural-language question to candidate SQL
//!
//! The output is a candidate only. Nothing here checks it beyond stripping
//! markdown; the validator decides whether it may run.

use crate::db::schema::{CanonicalSchema, SqlDialect};
use crate::error::{AgentError, Result};
use crate::llm::{strip_code_fences, CompletionRequest, LanguageModel};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = "You are an SQL expert. You translate questions about a social media \
     database into a single read-only SQL query. Only output the SQL query.";

pub struct SqlGenerator {
    model: Arc<dyn LanguageModel>,
    schema_description: String,
    dialect: SqlDialect,
    retry: RetryPolicy,
}

impl SqlGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, schema: &CanonicalSchema, dialect: SqlDialect, retry: RetryPolicy) -> Self {
        Self {
            model,
            schema_description: schema.describe(dialect),
            dialect,
            retry,
        }
    }

    pub fn build_prompt(&self, question: &str) -> String {
        format!(
            "Given the following database schema:\n\n{}\n\
             Write one {} SELECT statement that answers the question below. \
             Do not modify data. Do not use tables or columns that are not listed.\n\n\
             Question: \"{}\"\n\nSQL:",
            self.schema_description,
            self.dialect.name(),
            question.trim()
        )
    }

    /// Ask the model for a candidate statement. Empty replies count as
    /// failures and are retried with the transport errors.
    pub async fn generate(&self, question: &str) -> Result<String> {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: self.build_prompt(question),
            temperature: 0.0,
            max_tokens: 300,
        };

        let model = &self.model;
        let request = &request;
        let candidate = self
            .retry
            .run("generate_sql", || async move {
                let reply = model.complete(request).await?;
                let sql = strip_code_fences(&reply);
                if sql.is_empty() {
                    return Err(AgentError::Generation("model returned an empty response".to_string()));
                }
                Ok(sql.to_string())
            })
            .await
            .map_err(|e| {
                AgentError::Generation(format!(
                    "no SQL after {} attempt(s): {}",
                    self.retry.max_attempts, e
                ))
            })?;

        info!(model = self.model.name(), "generated candidate SQL");
        debug!(sql = %candidate);
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyModel {
        replies: Vec<Result<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for FlakyModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.replies[call.min(self.replies.len() - 1)] {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(AgentError::Generation(e.to_string())),
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn generator(replies: Vec<Result<String>>) -> (SqlGenerator, Arc<FlakyModel>) {
        let model = Arc::new(FlakyModel {
            replies,
            calls: AtomicUsize::new(0),
        });
        let generator = SqlGenerator::new(
            model.clone(),
            &CanonicalSchema::social(),
            SqlDialect::Postgres,
            RetryPolicy::immediate(3),
        );
        (generator, model)
    }

    #[test]
    fn test_prompt_carries_schema_and_question() {
        let (generator, _) = generator(vec![Ok("SELECT 1".to_string())]);
        let prompt = generator.build_prompt("How many posts come from reddit?");
        assert!(prompt.contains("TABLE posts:"));
        assert!(prompt.contains("TABLE comments:"));
        assert!(prompt.contains("How many posts come from reddit?"));
        assert!(prompt.contains("PostgreSQL"));
    }

    #[tokio::test]
    async fn test_strips_fences() {
        let (generator, _) = generator(vec![Ok("```sql\nSELECT COUNT(*) FROM posts;\n```".to_string())]);
        let sql = generator.generate("count posts").await.unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM posts;");
    }

    #[tokio::test]
    async fn test_retries_empty_and_failed_replies() {
        let (generator, model) = generator(vec![
            Err(AgentError::Generation("timeout".to_string())),
            Ok("   ".to_string()),
            Ok("SELECT 1".to_string()),
        ]);
        assert_eq!(generator.generate("q").await.unwrap(), "SELECT 1");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_are_generation_error() {
        let (generator, model) = generator(vec![Ok(String::new())]);
        let err = generator.generate("q").await.unwrap_err();
        assert_eq!(err.kind(), "GenerationError");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }
}
