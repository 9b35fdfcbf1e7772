// crates/axelis-server/src/error.rs
// Standardized error types for Axelis

use thiserror::Error;

/// Main error type for the Axelis library
#[derive(Error, Debug)]
pub enum AxelisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML configuration error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using AxelisError
pub type Result<T> = std::result::Result<T, AxelisError>;

impl From<String> for AxelisError {
    fn from(s: String) -> Self {
        AxelisError::Other(s)
    }
}

impl From<tokio::task::JoinError> for AxelisError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            AxelisError::Cancelled
        } else {
            AxelisError::Other(err.to_string())
        }
    }
}

impl From<AxelisError> for String {
    fn from(err: AxelisError) -> Self {
        err.to_string()
    }
}
