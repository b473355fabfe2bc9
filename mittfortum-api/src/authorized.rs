//! Token-aware API access with the 401 policy.
//!
//! A 401 triggers exactly one forced refresh and one retry. A second 401 in
//! a row means the session is gone and surfaces as [`ApiError::AuthExpired`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use mittfortum_core::{ConsumptionSample, DateRange, MeteringPoint, Resolution, TokenSet};
use tracing::{debug, warn};

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::oauth::AuthClient;

/// What the poller needs from the provider.
#[async_trait]
pub trait ConsumptionSource: Send + Sync {
    /// Makes sure a usable token exists, refreshing if needed.
    async fn ensure_authorized(&self) -> Result<(), ApiError>;

    /// Fetches consumption for one metering point and window.
    async fn fetch_consumption(
        &self,
        metering_point: &str,
        range: DateRange,
        resolution: Resolution,
    ) -> Result<Vec<ConsumptionSample>, ApiError>;

    /// Lists the customer's metering points.
    async fn discover_metering_points(&self) -> Result<Vec<MeteringPoint>, ApiError>;
}

/// [`ApiClient`] plus [`AuthClient`], with the refresh-once-on-401 policy.
#[derive(Debug, Clone)]
pub struct AuthorizedApi {
    auth: Arc<AuthClient>,
    api: ApiClient,
}

impl AuthorizedApi {
    /// Combines the two clients.
    pub fn new(auth: Arc<AuthClient>, api: ApiClient) -> Self {
        Self { auth, api }
    }

    /// The auth client.
    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    /// The unwrapped API client.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Runs `call` with a valid token, applying the 401 policy.
    pub async fn with_token<T, F, Fut>(&self, call: F) -> Result<T, ApiError>
    where
        F: Fn(TokenSet) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self.auth.ensure_valid_token().await?;
        let rejected = token.access_token.clone();

        match call(token).await {
            Err(ApiError::Unauthorized) => {
                debug!("API returned 401, forcing token refresh");
                let fresh = self.auth.force_refresh(&rejected).await?;
                match call(fresh).await {
                    Err(ApiError::Unauthorized) => {
                        warn!("API rejected a freshly refreshed token");
                        Err(ApiError::AuthExpired(
                            "access token rejected after refresh".to_string(),
                        ))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Display name of the logged-in user.
    pub async fn session_username(&self) -> Result<Option<String>, ApiError> {
        let api = &self.api;
        self.with_token(|token| async move { api.session_username(&token).await })
            .await
    }
}

#[async_trait]
impl ConsumptionSource for AuthorizedApi {
    async fn ensure_authorized(&self) -> Result<(), ApiError> {
        self.auth.ensure_valid_token().await.map(|_| ())
    }

    async fn fetch_consumption(
        &self,
        metering_point: &str,
        range: DateRange,
        resolution: Resolution,
    ) -> Result<Vec<ConsumptionSample>, ApiError> {
        let api = &self.api;
        self.with_token(|token| async move {
            api.fetch_consumption(&token, metering_point, range, resolution)
                .await
        })
        .await
    }

    async fn discover_metering_points(&self) -> Result<Vec<MeteringPoint>, ApiError> {
        let api = &self.api;
        self.with_token(|token| async move { api.discover_metering_points(&token).await })
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
