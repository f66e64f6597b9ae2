//! Error types for hazardscope

use thiserror::Error;

/// Result type alias using HazardScopeError
pub type Result<T> = std::result::Result<T, HazardScopeError>;

/// Error type alias for convenience
pub type Error = HazardScopeError;

/// Main error type for hazardscope
#[derive(Debug, Error)]
pub enum HazardScopeError {
    /// Neither query text nor an image was supplied.
    #[error("empty query: at least one of text or image is required")]
    EmptyQuery,

    /// A phase-2 call referenced a missing, expired, or consumed session.
    #[error("session expired or not found: {0}")]
    SessionExpired(String),

    /// Embedding or vector-index call failed after the retry budget.
    #[error("retrieval failure: {0}")]
    RetrievalFailure(String),

    /// Answer generation failed after the retry budget.
    #[error("generation failure: {0}")]
    GenerationFailure(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Terminal task failure; carries the last recorded error verbatim.
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HazardScopeError {
    /// Structural errors are caller mistakes and must never be retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuery
                | Self::SessionExpired(_)
                | Self::TaskNotFound(_)
                | Self::InvalidInput(_)
        )
    }
}
