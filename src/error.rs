// src/error.rs
// Standardized error types for Engram

use thiserror::Error;

/// Main error type for the Engram library
#[derive(Error, Debug)]
pub enum EngramError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using EngramError
pub type Result<T> = std::result::Result<T, EngramError>;

impl EngramError {
    /// Whether the error represents a fatal initialization problem.
    /// Configuration errors are never retried.
    pub fn is_config(&self) -> bool {
        matches!(self, EngramError::Config(_))
    }
}

impl From<String> for EngramError {
    fn from(s: String) -> Self {
        EngramError::Other(s)
    }
}

impl From<tokio::task::JoinError> for EngramError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            EngramError::Cancelled
        } else {
            EngramError::Other(err.to_string())
        }
    }
}

impl From<EngramError> for String {
    fn from(err: EngramError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = EngramError::Config("unknown embedder kind".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("unknown embedder kind"));
        assert!(err.is_config());
    }

    #[test]
    fn test_embedding_error() {
        let err = EngramError::Embedding("dimension mismatch".to_string());
        assert!(err.to_string().contains("embedding error"));
        assert!(err.to_string().contains("dimension mismatch"));
        assert!(!err.is_config());
    }

    #[test]
    fn test_not_found_error() {
        let err = EngramError::NotFound("entities".to_string());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_from_string() {
        let err: EngramError = "some error".to_string().into();
        assert!(matches!(err, EngramError::Other(_)));
        assert!(err.to_string().contains("some error"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngramError = io_err.into();
        assert!(matches!(err, EngramError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: EngramError = json_err.into();
        assert!(matches!(err, EngramError::Json(_)));
    }

    #[test]
    fn test_into_string() {
        let err = EngramError::Cancelled;
        let s: String = err.into();
        assert!(s.contains("cancelled"));
    }
}
