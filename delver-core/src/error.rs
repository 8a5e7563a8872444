//! Error types for the Delver research core.
//!
//! Uses `thiserror` for public API error types. The taxonomy mirrors how the
//! engine treats failures: configuration/contract violations are the only
//! fatal class, while retrieval and LLM faults are contained at the branch
//! boundary and degrade to empty results.

/// Top-level error type for the Delver core library.
#[derive(Debug, thiserror::Error)]
pub enum DelverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration surface.
///
/// These are contract violations: `run(...)` surfaces them before any
/// research work starts, never mid-traversal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Research question must not be empty")]
    EmptyQuestion,

    #[error("Breadth must be at least 1, got {breadth}")]
    InvalidBreadth { breadth: usize },

    #[error("Concurrency limit must be at least 1, got {limit}")]
    InvalidConcurrencyLimit { limit: usize },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from retriever collaborators.
///
/// "No results" is never an error (retrievers return an empty list); these
/// variants cover genuine transport faults only.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Search request failed: {message}")]
    RequestFailed { message: String },

    #[error("Search response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Search timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// A type alias for results using the top-level `DelverError`.
pub type Result<T> = std::result::Result<T, DelverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = DelverError::Config(ConfigError::InvalidBreadth { breadth: 0 });
        assert_eq!(
            err.to_string(),
            "Configuration error: Breadth must be at least 1, got 0"
        );
    }

    #[test]
    fn test_error_display_llm() {
        let err = DelverError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_retrieval() {
        let err = DelverError::Retrieval(RetrievalError::Timeout { timeout_secs: 30 });
        assert_eq!(
            err.to_string(),
            "Retrieval error: Search timed out after 30s"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DelverError = io_err.into();
        assert!(matches!(err, DelverError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: DelverError = serde_err.into();
        assert!(matches!(err, DelverError::Serialization(_)));
    }
}
