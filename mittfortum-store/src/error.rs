//! Store error types.

use mittfortum_core::CoreError;
use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML could not be parsed.
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML could not be written.
    #[error("Config write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Keychain access failed.
    #[error("Keychain error: {0}")]
    Keychain(#[from] mittfortum_fetch::FetchError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored data failed validation.
    #[error("Invalid data: {0}")]
    Invalid(String),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(_) | StoreError::Task(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(msg) => CoreError::InvalidConfig(msg),
            StoreError::Invalid(msg) => CoreError::InvalidData(msg),
            other => CoreError::Host(other.to_string()),
        }
    }
}
