//! Core error types for `MittFortum`.

use thiserror::Error;

/// Core error type for `MittFortum` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Locale code is not one of the supported markets or languages.
    #[error("Unsupported locale: {0}")]
    UnsupportedLocale(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data from an API response or a host store.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A host capability (secret store, statistics sink) failed.
    #[error("Host capability failed: {0}")]
    Host(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}
