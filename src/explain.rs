//! Explanation Generator - turns an executed result back into prose

use crate::error::{AgentError, Result};
use crate::execution::result::QueryResult;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::retry::RetryPolicy;
use crate::sql_validator::ValidatedStatement;
use std::sync::Arc;
use tracing::info;

const SYSTEM_PROMPT: &str = "You explain database query results to non-technical readers. \
     Be clear, concise and specific; quote the numbers from the results.";

pub struct ExplanationGenerator {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    sample_rows: usize,
}

impl ExplanationGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy, sample_rows: usize) -> Self {
        Self {
            model,
            retry,
            sample_rows,
        }
    }

    pub fn build_prompt(&self, question: &str, statement: &ValidatedStatement, result: &QueryResult) -> Result<String> {
        let sample = result.sample(self.sample_rows);
        let shown = if sample.len() < result.row_count {
            format!("first {} of {} rows", sample.len(), result.row_count)
        } else {
            format!("all {} rows", result.row_count)
        };
        Ok(format!(
            "The user asked: \"{}\"\n\n\
             This SQL query was executed:\n{}\n\n\
             It returned {} row(s). Results ({}):\n{}\n\n\
             Provide a clear and concise explanation of these results that answers the question. \
             Be as specific as possible.",
            question.trim(),
            statement.as_str(),
            result.row_count,
            shown,
            serde_json::to_string_pretty(&sample)?
        ))
    }

    pub async fn explain(&self, question: &str, statement: &ValidatedStatement, result: &QueryResult) -> Result<String> {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: self.build_prompt(question, statement, result)?,
            temperature: 0.7,
            max_tokens: 300,
        };

        let model = &self.model;
        let request = &request;
        let explanation = self
            .retry
            .run("explain_results", || async move {
                let reply = model.complete(request).await?;
                let text = reply.trim();
                if text.is_empty() {
                    return Err(AgentError::Generation("model returned an empty explanation".to_string()));
                }
                Ok(text.to_string())
            })
            .await
            .map_err(|e| {
                AgentError::Generation(format!(
                    "no explanation after {} attempt(s): {}",
                    self.retry.max_attempts, e
                ))
            })?;

        info!(model = self.model.name(), chars = explanation.len(), "explanation generated");
        Ok(explanation)
    }
}
