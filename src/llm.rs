//! Language model boundary
//!
//! Everything that comes back through [`LanguageModel`] is untrusted text.

use crate::config::LlmSettings;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// One chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the model's text reply. Transport failures, non-success HTTP
    /// statuses and replies without content are `Generation` errors.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn name(&self) -> &str;
}

/// OpenAI-compatible chat-completions client
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AgentError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt}
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens
        })
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| AgentError::Generation(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Generation(format!(
                "LLM API returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Generation(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::Generation("No content in LLM response".to_string()))?;

        debug!(model = %self.model, chars = content.len(), "LLM reply received");
        Ok(content.to_string())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`sql`, `postgresql`, ...) on the opening line.
    let inner = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.strip_prefix("sql").unwrap_or(rest),
    };
    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_code_fences("```\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fences("```SELECT 1```"), "SELECT 1");
    }

    #[test]
    fn test_request_body_shape() {
        let client = LlmClient::new(&LlmSettings {
            api_key: "key".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "http://localhost:1/v1/".to_string(),
            timeout: Duration::from_secs(1),
            max_attempts: 1,
        })
        .unwrap();
        let body = client.body(&CompletionRequest {
            system: "sys".to_string(),
            prompt: "question".to_string(),
            temperature: 0.0,
            max_tokens: 300,
        });
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][1]["content"], "question");
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(client.base_url, "http://localhost:1/v1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_error() {
        let client = LlmClient::new(&LlmSettings {
            api_key: "key".to_string(),
            model: "m".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            max_attempts: 1,
        })
        .unwrap();
        let err = client
            .complete(&CompletionRequest {
                system: String::new(),
                prompt: "hi".to_string(),
                temperature: 0.0,
                max_tokens: 10,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "GenerationError");
    }
}
