//! Error Types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input rejected before any persistence or payment call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record store unreachable or write rejected
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record store did not answer in time
    #[error("Storage timeout after {0}s")]
    Timeout(u64),

    /// Document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document was modified concurrently and the write lost the race
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Persisted document could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// HTTP transport error talking to the document database
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Check if the caller may retry the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Storage(_) | CoreError::Timeout(_) | CoreError::Conflict(_) | CoreError::Http(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(msg) => msg.clone(),
            CoreError::NotFound(what) => format!("{what} was not found."),
            CoreError::Storage(_) | CoreError::Timeout(_) | CoreError::Conflict(_) | CoreError::Http(_) => {
                "Our records service is temporarily unavailable. Please try again.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}
