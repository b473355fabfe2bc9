//! Fortum endpoint URLs.
//!
//! Everything the provider could rename lives here: market paths, the tRPC
//! procedure name, SSO paths, client id and scope. Bases can be overridden
//! so tests and proxies can point the clients elsewhere.

use chrono::{DateTime, SecondsFormat, Utc};
use mittfortum_core::{Locale, Market, Resolution};
use serde_json::json;
use url::Url;

use crate::error::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Public web site host.
pub const FORTUM_WEB_BASE: &str = "https://www.fortum.com";

/// Identity provider host.
pub const DEFAULT_SSO_BASE: &str = "https://sso.fortum.com";

/// OAuth2 path on the identity provider.
pub const DEFAULT_OAUTH_PATH: &str = "/am/oauth2";

/// Authentication-tree path on the identity provider.
pub const AUTHENTICATE_PATH: &str = "/am/json/realms/root/realms/alpha/authenticate";

/// OAuth client registered for the customer web site.
pub const DEFAULT_CLIENT_ID: &str = "globalwebprod";

/// Scopes requested at login.
pub const DEFAULT_SCOPE: &str = "openid profile crmdata";

/// tRPC procedure returning consumption time series.
pub const TIME_SERIES_PROCEDURE: &str = "loggedIn.timeSeries.listTimeSeries";

/// Path of the OAuth callback handled by the web site.
const CALLBACK_PATH: &str = "api/auth/callback/ciamprod";

// ============================================================================
// Endpoints
// ============================================================================

/// URL builder for one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    market: Market,
    market_base: String,
    sso_base: String,
    oauth_path: String,
    client_id: String,
    scope: String,
    quarter_hour_wire_name: Option<String>,
}

impl Endpoints {
    /// Production endpoints for `locale`.
    pub fn for_locale(locale: Locale) -> Self {
        let market = locale.market();
        Self {
            market,
            market_base: format!("{FORTUM_WEB_BASE}/{}", market.path()),
            sso_base: DEFAULT_SSO_BASE.to_string(),
            oauth_path: DEFAULT_OAUTH_PATH.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            quarter_hour_wire_name: None,
        }
    }

    /// Replaces the market base (`https://www.fortum.com/fi/sahkoa`).
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.market_base = trim_base(base.into());
        self
    }

    /// Replaces the identity provider base.
    #[must_use]
    pub fn with_sso_base(mut self, base: impl Into<String>) -> Self {
        self.sso_base = trim_base(base.into());
        self
    }

    /// Replaces the OAuth2 path on the identity provider.
    #[must_use]
    pub fn with_oauth_path(mut self, path: impl Into<String>) -> Self {
        self.oauth_path = format!("/{}", path.into().trim_matches('/'));
        self
    }

    /// Sets the OAuth client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Overrides the resolution name sent for quarter-hour requests.
    #[must_use]
    pub fn with_quarter_hour_wire_name(mut self, name: impl Into<String>) -> Self {
        self.quarter_hour_wire_name = Some(name.into());
        self
    }

    /// Market these endpoints talk to.
    pub fn market(&self) -> Market {
        self.market
    }

    /// OAuth client id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Requested scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Market base URL.
    pub fn market_base(&self) -> &str {
        &self.market_base
    }

    /// `{market}/api`.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.market_base)
    }

    /// `{market}/api/trpc`.
    pub fn trpc_base(&self) -> String {
        format!("{}/trpc", self.api_base())
    }

    /// Session document listing the customer and metering points.
    pub fn session_url(&self) -> String {
        format!("{}/auth/session", self.api_base())
    }

    /// Returns the logged-in user's display name.
    pub fn session_username_url(&self) -> String {
        format!("{}/get-session-username", self.api_base())
    }

    /// Redirect URI registered for the OAuth client.
    pub fn redirect_uri(&self) -> String {
        format!("{}/{CALLBACK_PATH}", self.market_base)
    }

    /// Logged-in landing page of the web site.
    pub fn logged_in_url(&self) -> String {
        format!("{FORTUM_WEB_BASE}/{}", self.market.logged_in_path())
    }

    /// OAuth2 authorize endpoint.
    pub fn authorize_url(&self) -> String {
        format!("{}{}/authorize", self.sso_base, self.oauth_path)
    }

    /// OAuth2 token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}{}/access_token", self.sso_base, self.oauth_path)
    }

    /// Start of the market's login journey on the identity provider.
    pub fn auth_init_url(&self) -> Result<String, ApiError> {
        let index_value = self.market.auth_index_value().to_lowercase();
        let url = Url::parse_with_params(
            &format!("{}{AUTHENTICATE_PATH}", self.sso_base),
            &[
                ("locale", self.market.sso_locale()),
                ("authIndexType", "service"),
                ("authIndexValue", index_value.as_str()),
            ],
        )
        .map_err(|e| ApiError::Config(format!("invalid SSO base: {e}")))?;
        Ok(url.into())
    }

    /// Wire name for `resolution`, honouring the quarter-hour override.
    pub fn wire_resolution(&self, resolution: Resolution) -> &str {
        match (resolution, &self.quarter_hour_wire_name) {
            (Resolution::QuarterHour, Some(name)) => name.as_str(),
            _ => resolution.wire_name(),
        }
    }

    /// tRPC batch URL for a time-series query.
    pub fn time_series_url(
        &self,
        metering_points: &[&str],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<String, ApiError> {
        let input = json!({
            "0": {
                "json": {
                    "meteringPointNo": metering_points,
                    "fromDate": from.to_rfc3339_opts(SecondsFormat::Millis, true),
                    "toDate": to.to_rfc3339_opts(SecondsFormat::Millis, true),
                    "resolution": self.wire_resolution(resolution),
                }
            }
        })
        .to_string();

        let url = Url::parse_with_params(
            &format!("{}/{TIME_SERIES_PROCEDURE}", self.trpc_base()),
            &[("batch", "1"), ("input", input.as_str())],
        )
        .map_err(|e| ApiError::Config(format!("invalid API base: {e}")))?;
        Ok(url.into())
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_market_urls() {
        let sv = Endpoints::for_locale(Locale::Sv);
        assert_eq!(sv.api_base(), "https://www.fortum.com/se/el/api");
        assert_eq!(sv.trpc_base(), "https://www.fortum.com/se/el/api/trpc");
        assert_eq!(sv.session_url(), "https://www.fortum.com/se/el/api/auth/session");
        assert_eq!(
            sv.session_username_url(),
            "https://www.fortum.com/se/el/api/get-session-username"
        );
        assert_eq!(
            sv.redirect_uri(),
            "https://www.fortum.com/se/el/api/auth/callback/ciamprod"
        );
        assert_eq!(sv.logged_in_url(), "https://www.fortum.com/inloggad/el");

        let no = Endpoints::for_locale(Locale::No);
        assert_eq!(no.api_base(), "https://www.fortum.com/no/strom/api");

        let en = Endpoints::for_locale(Locale::En);
        assert_eq!(en.market_base(), "https://www.fortum.com/fi/sahkoa");
    }

    #[test]
    fn test_auth_urls() {
        let fi = Endpoints::for_locale(Locale::Fi);
        assert_eq!(fi.authorize_url(), "https://sso.fortum.com/am/oauth2/authorize");
        assert_eq!(fi.token_url(), "https://sso.fortum.com/am/oauth2/access_token");

        let init = fi.auth_init_url().unwrap();
        assert!(init.contains("locale=fi"));
        assert!(init.contains("authIndexType=service"));
        assert!(init.contains("authIndexValue=fib2clogin"));

        let sv = Endpoints::for_locale(Locale::Sv).auth_init_url().unwrap();
        assert!(sv.contains("locale=sv"));
        assert!(sv.contains("authIndexValue=seb2cogwlogin"));
    }

    #[test]
    fn test_overrides() {
        let ep = Endpoints::for_locale(Locale::Fi)
            .with_api_base("http://127.0.0.1:9000/")
            .with_sso_base("http://127.0.0.1:9001")
            .with_oauth_path("oauth/")
            .with_client_id("test-client");

        assert_eq!(ep.session_url(), "http://127.0.0.1:9000/api/auth/session");
        assert_eq!(ep.token_url(), "http://127.0.0.1:9001/oauth/access_token");
        assert_eq!(ep.client_id(), "test-client");
    }

    #[test]
    fn test_time_series_url() {
        let ep = Endpoints::for_locale(Locale::Sv);
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let url = ep
            .time_series_url(&["123456789", "987654321"], from, to, Resolution::Day)
            .unwrap();

        assert!(url.starts_with(
            "https://www.fortum.com/se/el/api/trpc/loggedIn.timeSeries.listTimeSeries?"
        ));
        assert!(url.contains("batch=1"));

        let parsed = Url::parse(&url).unwrap();
        let input = parsed
            .query_pairs()
            .find(|(k, _)| k == "input")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let input: serde_json::Value = serde_json::from_str(&input).unwrap();
        let body = &input["0"]["json"];
        assert_eq!(body["meteringPointNo"][1], "987654321");
        assert_eq!(body["fromDate"], "2024-01-01T00:00:00.000Z");
        assert_eq!(body["resolution"], "DAY");
    }

    #[test]
    fn test_quarter_hour_override() {
        let ep = Endpoints::for_locale(Locale::Fi);
        assert_eq!(ep.wire_resolution(Resolution::QuarterHour), "QUARTER_HOUR");

        let ep = ep.with_quarter_hour_wire_name("PER_15_MIN");
        assert_eq!(ep.wire_resolution(Resolution::QuarterHour), "PER_15_MIN");
        assert_eq!(ep.wire_resolution(Resolution::Hour), "HOUR");
    }
}
