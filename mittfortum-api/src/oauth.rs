//! OAuth2 Authorization Code + PKCE client.
//!
//! # Flow
//!
//! 1. [`AuthClient::begin_authorization`] builds the authorize URL and keeps
//!    the PKCE verifier and `state` in an [`AuthorizationRequest`].
//! 2. The user logs in and is redirected to the web site's callback.
//! 3. [`AuthClient::complete_authorization`] takes the redirect URL (or the
//!    bare code), exchanges it at the token endpoint and persists the result.
//! 4. [`AuthClient::ensure_valid_token`] hands out the cached token set and
//!    refreshes it when it is about to expire.
//!
//! The token set lives behind one async mutex. Refreshing happens while the
//! lock is held, so concurrent callers never refresh twice.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mittfortum_core::{IntegrationContext, SecretStore, TokenSet};
use mittfortum_fetch::HttpClient;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::endpoints::Endpoints;
use crate::error::ApiError;
use crate::jwt;
use crate::pkce::{CHALLENGE_METHOD, PkcePair, generate_state};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// ============================================================================
// Wire Types
// ============================================================================

/// Token endpoint success body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    id_token: Option<String>,
}

/// Token endpoint error body.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    error_description: Option<String>,
}

impl OAuthErrorBody {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{}: {desc}", self.error),
            None => self.error.clone(),
        }
    }
}

// ============================================================================
// Authorization Request
// ============================================================================

/// A started login. Keep it until the redirect comes back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// URL to open in a browser.
    pub url: String,
    /// Expected `state` in the redirect.
    pub state: String,
    /// PKCE pair; the verifier goes to the token endpoint.
    pub pkce: PkcePair,
    /// Redirect URI sent with the request.
    pub redirect_uri: String,
}

impl AuthorizationRequest {
    /// Extracts the authorization code from a redirect URL or a bare code.
    ///
    /// A redirect URL must carry the same `state` this request was created with.
    pub fn extract_code(&self, redirect_or_code: &str) -> Result<String, ApiError> {
        let input = redirect_or_code.trim();
        if input.is_empty() {
            return Err(ApiError::Auth("no authorization code given".to_string()));
        }

        let Ok(url) = Url::parse(input) else {
            return Ok(input.to_string());
        };

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => {
                    return Err(ApiError::Auth(format!("authorization denied: {value}")));
                }
                _ => {}
            }
        }

        if state.as_deref() != Some(self.state.as_str()) {
            return Err(ApiError::Auth("state mismatch in redirect".to_string()));
        }
        code.filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::Auth("redirect has no code parameter".to_string()))
    }
}

// ============================================================================
// Auth Client
// ============================================================================

#[derive(Default)]
struct TokenCache {
    loaded: bool,
    token: Option<TokenSet>,
}

/// Single owner of the token set.
pub struct AuthClient {
    http: Arc<HttpClient>,
    endpoints: Endpoints,
    secrets: Arc<dyn SecretStore>,
    cache: Mutex<TokenCache>,
}

impl AuthClient {
    /// Creates a client. The stored token is loaded lazily.
    pub fn new(http: Arc<HttpClient>, endpoints: Endpoints, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            http,
            endpoints,
            secrets,
            cache: Mutex::new(TokenCache::default()),
        }
    }

    /// Creates a client that persists tokens in the context's secret store.
    pub fn for_context(
        http: Arc<HttpClient>,
        endpoints: Endpoints,
        ctx: &IntegrationContext,
    ) -> Self {
        Self::new(http, endpoints, ctx.secrets.clone())
    }

    /// Endpoints in use.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Starts a login: new PKCE pair, new `state`, authorize URL.
    pub fn begin_authorization(&self) -> Result<AuthorizationRequest, ApiError> {
        let pkce = PkcePair::generate()?;
        let state = generate_state()?;
        let redirect_uri = self.endpoints.redirect_uri();
        let market = self.endpoints.market();

        let url = Url::parse_with_params(
            &self.endpoints.authorize_url(),
            &[
                ("response_type", "code"),
                ("client_id", self.endpoints.client_id()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", self.endpoints.scope()),
                ("state", state.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", CHALLENGE_METHOD),
                ("locale", market.sso_locale()),
                ("authIndexType", "service"),
                ("authIndexValue", market.auth_index_value()),
            ],
        )
        .map_err(|e| ApiError::Config(format!("invalid authorize URL: {e}")))?;

        debug!(market = ?market, "Authorization started");
        Ok(AuthorizationRequest {
            url: url.into(),
            state,
            pkce,
            redirect_uri,
        })
    }

    /// Exchanges the code from the redirect for a token set and stores it.
    #[instrument(skip_all)]
    pub async fn complete_authorization(
        &self,
        request: &AuthorizationRequest,
        redirect_or_code: &str,
    ) -> Result<TokenSet, ApiError> {
        let code = request.extract_code(redirect_or_code)?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", self.endpoints.client_id()),
            ("code_verifier", request.pkce.verifier.as_str()),
        ];
        let response = self.http.post_form(&self.endpoints.token_url(), &form).await?;
        let token = read_token_response(response, None, Utc::now()).await?;

        let mut cache = self.cache.lock().await;
        self.store(&mut cache, token.clone()).await?;
        info!(expires_at = %token.expires_at, "Authorization completed");
        Ok(token)
    }

    /// Returns an unexpired token set, refreshing if needed.
    pub async fn ensure_valid_token(&self) -> Result<TokenSet, ApiError> {
        self.ensure_valid_token_at(Utc::now()).await
    }

    /// [`Self::ensure_valid_token`] with an explicit clock.
    #[instrument(skip(self))]
    pub async fn ensure_valid_token_at(&self, now: DateTime<Utc>) -> Result<TokenSet, ApiError> {
        let mut cache = self.cache.lock().await;
        let current = self.cached(&mut cache).await?;

        if !current.is_expired_at(now) {
            return Ok(current);
        }

        debug!(expires_at = %current.expires_at, "Access token expired, refreshing");
        self.refresh_locked(&mut cache, &current, now).await
    }

    /// Refreshes after the API rejected `rejected_access_token`.
    ///
    /// If another caller already replaced that token, the current one is
    /// returned without contacting the token endpoint.
    #[instrument(skip_all)]
    pub async fn force_refresh(&self, rejected_access_token: &str) -> Result<TokenSet, ApiError> {
        let now = Utc::now();
        let mut cache = self.cache.lock().await;
        let current = self.cached(&mut cache).await?;

        if current.access_token != rejected_access_token && !current.is_expired_at(now) {
            debug!("Token already replaced by another caller");
            return Ok(current);
        }

        self.refresh_locked(&mut cache, &current, now).await
    }

    /// Returns the stored token set without refreshing.
    pub async fn current_token(&self) -> Result<Option<TokenSet>, ApiError> {
        let mut cache = self.cache.lock().await;
        self.load_once(&mut cache).await?;
        Ok(cache.token.clone())
    }

    /// Customer id from the id token.
    pub async fn customer_id(&self) -> Result<String, ApiError> {
        let token = self.ensure_valid_token().await?;
        let id_token = token
            .id_token
            .ok_or_else(|| ApiError::DataValidation("no id token stored".to_string()))?;
        jwt::customer_id(&id_token)
    }

    /// Forgets the token set, in memory and in the secret store.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let mut cache = self.cache.lock().await;
        cache.token = None;
        cache.loaded = true;
        self.secrets
            .clear_token()
            .await
            .map_err(|e| ApiError::secret(&e))?;
        info!("Token cleared");
        Ok(())
    }

    async fn load_once(&self, cache: &mut TokenCache) -> Result<(), ApiError> {
        if !cache.loaded {
            cache.token = self
                .secrets
                .load_token()
                .await
                .map_err(|e| ApiError::secret(&e))?;
            cache.loaded = true;
        }
        Ok(())
    }

    async fn cached(&self, cache: &mut TokenCache) -> Result<TokenSet, ApiError> {
        self.load_once(cache).await?;
        cache
            .token
            .clone()
            .ok_or_else(|| ApiError::AuthExpired("not logged in".to_string()))
    }

    async fn store(&self, cache: &mut TokenCache, token: TokenSet) -> Result<(), ApiError> {
        self.secrets
            .save_token(&token)
            .await
            .map_err(|e| ApiError::secret(&e))?;
        cache.token = Some(token);
        cache.loaded = true;
        Ok(())
    }

    async fn refresh_locked(
        &self,
        cache: &mut TokenCache,
        current: &TokenSet,
        now: DateTime<Utc>,
    ) -> Result<TokenSet, ApiError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", self.endpoints.client_id()),
        ];
        let response = self.http.post_form(&self.endpoints.token_url(), &form).await?;
        let token = read_token_response(response, Some(current), now).await?;

        if token.access_token == current.access_token {
            warn!("Token endpoint returned the previous access token");
            return Err(ApiError::Auth(
                "refresh returned the same access token".to_string(),
            ));
        }

        self.store(cache, token.clone()).await?;
        info!(expires_at = %token.expires_at, "Access token refreshed");
        Ok(token)
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Turns a token endpoint response into a token set.
///
/// On refresh, `previous` supplies the refresh token when the response omits it.
async fn read_token_response(
    response: reqwest::Response,
    previous: Option<&TokenSet>,
    now: DateTime<Utc>,
) -> Result<TokenSet, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ApiError::ApiUnavailable(format!("token endpoint returned {status}")));
    }

    if !status.is_success() {
        return Err(match serde_json::from_str::<OAuthErrorBody>(&body) {
            Ok(err) if err.error == "invalid_grant" => ApiError::AuthExpired(err.describe()),
            Ok(err) => ApiError::Auth(err.describe()),
            Err(_) => ApiError::Auth(format!("token endpoint returned {status}")),
        });
    }

    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| ApiError::DataValidation(format!("token response: {e}")))?;

    let refresh_token = parsed
        .refresh_token
        .or_else(|| previous.map(|p| p.refresh_token.clone()))
        .ok_or_else(|| ApiError::Auth("token response has no refresh_token".to_string()))?;

    let expires_at = expiry(now, parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))?;
    let mut token = TokenSet::new(parsed.access_token, refresh_token, expires_at);
    token.id_token = parsed
        .id_token
        .or_else(|| previous.and_then(|p| p.id_token.clone()));

    token
        .validate()
        .map_err(|e| ApiError::DataValidation(e.to_string()))?;
    Ok(token)
}

/// `now + expires_in`, rejecting lifetimes that are not positive or overflow.
fn expiry(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, ApiError> {
    if expires_in <= 0 {
        return Err(ApiError::DataValidation(format!(
            "token expires_in must be positive, got {expires_in}"
        )));
    }
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| ApiError::DataValidation(format!("token expires_in out of range: {expires_in}")))
}

// ============================================================================
// Tests
// ============================================================================
