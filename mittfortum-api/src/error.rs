//! API error taxonomy.

use chrono::NaiveDate;
use thiserror::Error;

use mittfortum_core::CoreError;
use mittfortum_fetch::{FetchError, HttpError};

/// Errors surfaced by the auth client and the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials were rejected (bad client, forbidden resource).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The refresh token no longer works; the user must log in again.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Network failure, timeout, 5xx or rate limit.
    #[error("API unavailable: {0}")]
    ApiUnavailable(String),

    /// The provider has not published data for the requested window yet.
    #[error("Data not ready for {metering_point} on {date}")]
    DataNotReady {
        /// Metering point that was queried.
        metering_point: String,
        /// Local date of the requested window.
        date: NaiveDate,
    },

    /// Payload could not be parsed or failed validation.
    #[error("Invalid data: {0}")]
    DataValidation(String),

    /// The API answered 401. Consumed by the retry policy.
    #[error("Unauthorized")]
    Unauthorized,

    /// Misconfigured endpoint, locale or client.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The secret store failed.
    #[error("Secret store error: {0}")]
    Secret(String),
}

impl ApiError {
    /// Returns true if the next scheduled attempt may succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ApiUnavailable(_) | Self::DataNotReady { .. })
    }

    /// Returns true if the user has to authorize again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::AuthExpired(_))
    }

    /// Returns true for the expected "not published yet" outcome.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::DataNotReady { .. })
    }

    /// Wraps a secret store failure.
    pub fn secret(err: &CoreError) -> Self {
        Self::Secret(err.to_string())
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        if err.is_transient() {
            ApiError::ApiUnavailable(err.to_string())
        } else {
            ApiError::Config(err.to_string())
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http(e) => e.into(),
            FetchError::Json(e) => ApiError::DataValidation(e.to_string()),
            FetchError::Keychain(e) => ApiError::Secret(e.to_string()),
            FetchError::Core(e) => ApiError::DataValidation(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        HttpError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ApiError::ApiUnavailable("503".into()).is_transient());
        assert!(
            ApiError::DataNotReady {
                metering_point: "1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            }
            .is_transient()
        );
        assert!(!ApiError::DataValidation("x".into()).is_transient());

        assert!(ApiError::AuthExpired("invalid_grant".into()).requires_reauth());
        assert!(ApiError::Auth("invalid_client".into()).requires_reauth());
        assert!(!ApiError::Unauthorized.requires_reauth());
    }

    #[test]
    fn test_http_error_mapping() {
        assert!(matches!(
            ApiError::from(HttpError::Timeout),
            ApiError::ApiUnavailable(_)
        ));
        assert!(matches!(
            ApiError::from(HttpError::DomainNotAllowed("evil.com".into())),
            ApiError::Config(_)
        ));
    }
}
