use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unclassifiable record: {0}")]
    UnclassifiableRecord(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Batch persist error: {0}")]
    BatchPersist(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Unsafe query: {0}")]
    UnsafeQuery(String),

    #[error("Unknown schema reference: {0}")]
    UnknownSchemaReference(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Source file error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Stable label used in ingestion summaries and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::UnclassifiableRecord(_) => "UnclassifiableRecord",
            AgentError::Mapping(_) => "MappingError",
            AgentError::BatchPersist(_) => "BatchPersistError",
            AgentError::Generation(_) => "GenerationError",
            AgentError::UnsafeQuery(_) => "UnsafeQueryError",
            AgentError::UnknownSchemaReference(_) => "UnknownSchemaReferenceError",
            AgentError::Execution(_) => "ExecutionError",
            AgentError::Configuration(_) => "ConfigurationError",
            AgentError::Source(_) => "SourceError",
            AgentError::Io(_) => "IoError",
            AgentError::Json(_) => "JsonError",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_match_taxonomy() {
        assert_eq!(AgentError::Mapping("x".into()).kind(), "MappingError");
        assert_eq!(AgentError::UnsafeQuery("x".into()).kind(), "UnsafeQueryError");
        assert_eq!(
            AgentError::UnknownSchemaReference("users".into()).to_string(),
            "Unknown schema reference: users"
        );
    }
}
