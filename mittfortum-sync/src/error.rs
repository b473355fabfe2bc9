//! Poller error types.

use mittfortum_api::ApiError;
use mittfortum_core::CoreError;
use thiserror::Error;

/// Errors that end a poll cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Provider or auth failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Statistics sink or model validation failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Returns true if the next scheduled tick may succeed without user action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api(e) => e.is_transient(),
            Self::Core(_) => false,
        }
    }

    /// Returns true if the user has to authorize again.
    pub fn requires_reauth(&self) -> bool {
        match self {
            Self::Api(e) => e.requires_reauth() || matches!(e, ApiError::Unauthorized),
            _ => false,
        }
    }

    /// Translation key for the user-facing message.
    pub fn i18n_key(&self) -> &'static str {
        match self {
            Self::Api(ApiError::Auth(_) | ApiError::Unauthorized) => "error.auth",
            Self::Api(ApiError::AuthExpired(_)) => "error.auth_expired",
            Self::Api(ApiError::ApiUnavailable(_)) => "error.api_unavailable",
            Self::Api(ApiError::DataNotReady { .. }) => "error.data_not_ready",
            _ => "error.data_validation",
        }
    }
}
