//! Error types for the Sluice service.

use thiserror::Error;

/// Main error type for Sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    /// A key is absent from the store. Expected when reading block markers.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The counter store failed, timed out, or the call was cancelled
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SluiceError {
    /// Whether this error only signals the absence of a key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SluiceError::NotFound(_))
    }
}

impl From<redis::RedisError> for SluiceError {
    fn from(err: redis::RedisError) -> Self {
        SluiceError::Store(err.to_string())
    }
}

impl From<config::ConfigError> for SluiceError {
    fn from(err: config::ConfigError) -> Self {
        SluiceError::Config(err.to_string())
    }
}

/// Result type alias for Sluice operations.
pub type Result<T> = std::result::Result<T, SluiceError>;
