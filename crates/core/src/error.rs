//! Errors raised below the ensemble layer.
//!
//! The ensemble crate lifts these into its request-level errors; only
//! [`AppError::RetrievalUnavailable`] is absorbed by experts instead of
//! propagated.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or missing settings, unknown providers, bad registrations
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The generation backend failed or returned garbage
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index misuse, e.g. a dimension mismatch or duplicate id
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Embedding service or domain index unreachable. Experts answer without
    /// context at reduced confidence.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn is_retrieval_unavailable(&self) -> bool {
        matches!(self, Self::RetrievalUnavailable(_))
    }
}

macro_rules! serialization_from {
    ($($source:ty),+) => {
        $(impl From<$source> for AppError {
            fn from(err: $source) -> Self {
                Self::Serialization(err.to_string())
            }
        })+
    };
}

serialization_from!(serde_json::Error, serde_yaml::Error);

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_outages_count_as_unavailable() {
        let outage = AppError::RetrievalUnavailable("chemistry index detached".to_string());
        assert!(outage.is_retrieval_unavailable());
        assert_eq!(outage.to_string(), "Retrieval unavailable: chemistry index detached");

        assert!(!AppError::Knowledge("dimension mismatch".to_string()).is_retrieval_unavailable());
    }

    #[test]
    fn test_parse_failures_become_serialization_errors() {
        let json: AppError = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        let yaml: AppError = serde_yaml::from_str::<u32>("[1, 2").unwrap_err().into();
        assert!(matches!(json, AppError::Serialization(_)));
        assert!(matches!(yaml, AppError::Serialization(_)));
    }
}
