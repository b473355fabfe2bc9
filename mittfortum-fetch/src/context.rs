//! Fetch context providing access to host APIs.
//!
//! The context is shared by the auth client, the API client and the token
//! store, so all of them agree on one HTTP client and one keychain.

use std::sync::Arc;
use std::time::Duration;

use crate::error::HttpError;
use crate::host::{
    http::{FORTUM_DOMAINS, HttpClient, HttpSettings},
    keychain::{KeychainApi, SystemKeychain},
};

// ============================================================================
// Fetch Settings
// ============================================================================

/// Settings for network operations.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// HTTP timeouts.
    pub http: HttpSettings,
    /// Restrict requests to Fortum domains.
    pub restrict_domains: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            http: HttpSettings::default(),
            restrict_domains: true,
        }
    }
}

impl FetchSettings {
    /// Sets the total request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.http.connect_timeout = timeout;
        self
    }

    /// Allows requests to any host. Used when endpoints are overridden.
    #[must_use]
    pub fn unrestricted(mut self) -> Self {
        self.restrict_domains = false;
        self
    }

    fn build_http(&self) -> Result<HttpClient, HttpError> {
        let client = HttpClient::with_settings(self.http)?;
        Ok(if self.restrict_domains {
            client.with_allowed_domains(FORTUM_DOMAINS.iter().copied())
        } else {
            client
        })
    }
}

// ============================================================================
// Fetch Context
// ============================================================================

/// Bundles the keychain and HTTP client.
#[derive(Clone)]
pub struct FetchContext {
    /// Secure credential storage.
    pub keychain: Arc<dyn KeychainApi>,
    /// HTTP client with tracing.
    pub http: Arc<HttpClient>,
    /// Fetch settings.
    pub settings: FetchSettings,
}

impl FetchContext {
    /// Creates a context with default host implementations.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_settings(FetchSettings::default())
    }

    /// Creates a context with custom settings.
    pub fn with_settings(settings: FetchSettings) -> Result<Self, HttpError> {
        Ok(Self {
            keychain: Arc::new(SystemKeychain::new()),
            http: Arc::new(settings.build_http()?),
            settings,
        })
    }

    /// Creates a builder for customizing the context.
    pub fn builder() -> FetchContextBuilder {
        FetchContextBuilder::new()
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.settings.http.timeout
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Fetch Context Builder
// ============================================================================

/// Builder for creating customized fetch contexts.
#[derive(Default)]
pub struct FetchContextBuilder {
    keychain: Option<Arc<dyn KeychainApi>>,
    http: Option<Arc<HttpClient>>,
    settings: FetchSettings,
}

impl FetchContextBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom keychain implementation.
    #[must_use]
    pub fn keychain(mut self, keychain: Arc<dyn KeychainApi>) -> Self {
        self.keychain = Some(keychain);
        self
    }

    /// Sets a custom HTTP client.
    #[must_use]
    pub fn http(mut self, http: Arc<HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Sets the fetch settings.
    #[must_use]
    pub fn settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the fetch context.
    pub fn build(self) -> Result<FetchContext, HttpError> {
        let http = match self.http {
            Some(http) => http,
            None => Arc::new(self.settings.build_http()?),
        };

        Ok(FetchContext {
            keychain: self
                .keychain
                .unwrap_or_else(|| Arc::new(SystemKeychain::new())),
            http,
            settings: self.settings,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
