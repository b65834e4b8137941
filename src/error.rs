//! Error types for mailforge
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in mailforge
#[derive(Debug, Error)]
pub enum MailforgeError {
    /// Text-generation API error (transport retries exhausted or HTTP error)
    #[error("Generation error: {0}")]
    Generation(String),

    /// Candidate script execution error
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Template cache read/write error
    #[error("Template error: {0}")]
    Template(String),

    /// Caller-supplied input rejected (bad address, missing key, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for mailforge operations
pub type Result<T> = std::result::Result<T, MailforgeError>;
