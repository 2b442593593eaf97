// Error handling module
// Defines the errors surfaced by the API client

use thiserror::Error;

/// Errors that can occur while executing an authenticated request
#[derive(Error, Debug)]
pub enum ApiError {
    /// The session could not be recovered; the caller must re-authenticate
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (connection, timeout, body decode)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;
