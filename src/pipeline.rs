//! Query pipeline: question -> SQL -> validated statement -> rows -> prose

use crate::config::AgentConfig;
use crate::db::schema::CanonicalSchema;
use crate::db::RecordStore;
use crate::error::Result;
use crate::execution::executor::QueryExecutor;
use crate::execution::result::QueryResult;
use crate::explain::ExplanationGenerator;
use crate::llm::LanguageModel;
use crate::retry::RetryPolicy;
use crate::sql_generator::SqlGenerator;
use crate::sql_validator::{SqlValidator, ValidatedStatement};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Everything produced while answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    #[serde(serialize_with = "serialize_statement")]
    pub sql: ValidatedStatement,
    pub result: QueryResult,
    pub explanation: String,
}

fn serialize_statement<S: serde::Serializer>(statement: &ValidatedStatement, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(statement.as_str())
}

pub struct QueryPipeline {
    generator: SqlGenerator,
    validator: SqlValidator,
    executor: QueryExecutor,
    explainer: ExplanationGenerator,
}

impl QueryPipeline {
    pub fn new(
        generator: SqlGenerator,
        validator: SqlValidator,
        executor: QueryExecutor,
        explainer: ExplanationGenerator,
    ) -> Self {
        Self {
            generator,
            validator,
            executor,
            explainer,
        }
    }

    /// Wire every stage from configuration, a model and an opened store.
    pub fn from_config(config: &AgentConfig, model: Arc<dyn LanguageModel>, store: Arc<dyn RecordStore>) -> Self {
        let schema = CanonicalSchema::social();
        let dialect = store.dialect();
        let retry = RetryPolicy::with_attempts(config.llm.max_attempts);
        Self::new(
            SqlGenerator::new(model.clone(), &schema, dialect, retry.clone()),
            SqlValidator::new(schema, dialect),
            QueryExecutor::new(store, config.query_timeout),
            ExplanationGenerator::new(model, retry, config.explanation_sample_rows),
        )
    }

    /// Generate and validate without executing.
    pub async fn plan(&self, question: &str) -> Result<ValidatedStatement> {
        let candidate = self.generator.generate(question).await?;
        Ok(self.validator.validate(&candidate)?)
    }

    pub async fn answer(&self, question: &str) -> Result<Answer> {
        info!(question, "answering question");
        let sql = self.plan(question).await?;
        let result = self.executor.execute(&sql).await?;
        let explanation = self.explainer.explain(question, &sql, &result).await?;
        Ok(Answer {
            question: question.to_string(),
            sql,
            result,
            explanation,
        })
    }
}
