//! Fortum API client.
//!
//! Stateless apart from the endpoints: every call takes the token set it
//! should use. The 401 policy lives one layer up in
//! [`crate::authorized::AuthorizedApi`].

use std::sync::Arc;

use chrono_tz::Tz;
use mittfortum_core::{ConsumptionSample, DateRange, MeteringPoint, Resolution, TokenSet};
use mittfortum_fetch::{HttpClient, ResponseExt};
use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use crate::endpoints::Endpoints;
use crate::error::ApiError;
use crate::parser;

/// Client for the time-series and session endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Arc<HttpClient>,
    endpoints: Endpoints,
}

impl ApiClient {
    /// Creates a client.
    pub fn new(http: Arc<HttpClient>, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    /// Endpoints in use.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Market time zone; used to name the day a range belongs to.
    fn timezone(&self) -> Tz {
        self.endpoints.market().timezone()
    }

    /// Fetches consumption for one metering point.
    ///
    /// An empty window is reported as [`ApiError::DataNotReady`].
    #[instrument(skip(self, token), fields(metering_point = %metering_point, resolution = %resolution))]
    pub async fn fetch_consumption(
        &self,
        token: &TokenSet,
        metering_point: &str,
        range: DateRange,
        resolution: Resolution,
    ) -> Result<Vec<ConsumptionSample>, ApiError> {
        let url = self
            .endpoints
            .time_series_url(&[metering_point], range.start, range.end, resolution)?;
        let body = self.get_authorized(&url, token).await?;

        let samples = parser::parse_time_series(&body, metering_point, range, resolution)?;
        if samples.is_empty() {
            let date = range.start.with_timezone(&self.timezone()).date_naive();
            debug!(date = %date, "No samples in window");
            return Err(ApiError::DataNotReady {
                metering_point: metering_point.to_string(),
                date,
            });
        }

        info!(count = samples.len(), "Fetched consumption");
        Ok(samples)
    }

    /// Lists the metering points in the customer's session.
    #[instrument(skip(self, token))]
    pub async fn discover_metering_points(
        &self,
        token: &TokenSet,
    ) -> Result<Vec<MeteringPoint>, ApiError> {
        let body = self.get_authorized(&self.endpoints.session_url(), token).await?;
        let points = parser::parse_session(&body)?;
        info!(count = points.len(), "Discovered metering points");
        Ok(points)
    }

    /// Display name of the logged-in user, when the site reports one.
    #[instrument(skip(self, token))]
    pub async fn session_username(&self, token: &TokenSet) -> Result<Option<String>, ApiError> {
        let body = self
            .get_authorized(&self.endpoints.session_username_url(), token)
            .await?;
        Ok(parser::parse_username(&body))
    }

    async fn get_authorized(&self, url: &str, token: &TokenSet) -> Result<String, ApiError> {
        let response = self.http.get_with_bearer(url, &token.access_token).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.text().await?);
        }

        if response.is_rate_limited() {
            warn!(retry_after = ?response.retry_after_secs(), "Rate limited");
        }
        Err(status_error(status))
    }
}

/// Maps a non-success status to the error taxonomy.
pub(crate) fn status_error(status: StatusCode) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Auth("access forbidden".to_string()),
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
            ApiError::ApiUnavailable(format!("server returned {s}"))
        }
        s if s.is_client_error() => {
            ApiError::DataValidation(format!("request rejected with {s}"))
        }
        s => ApiError::ApiUnavailable(format!("unexpected status {s}")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};
    use mittfortum_core::Locale;
    use serde_json::json;

    fn token() -> TokenSet {
        TokenSet::new("a1", "r1", Utc::now() + Duration::hours(1))
    }

    fn client(server: &mockito::Server) -> ApiClient {
        let endpoints = Endpoints::for_locale(Locale::Fi).with_api_base(server.url());
        ApiClient::new(Arc::new(HttpClient::new().unwrap()), endpoints)
    }

    fn day() -> DateRange {
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        DateRange::for_local_day(date, Locale::Fi.timezone()).unwrap()
    }

    fn series_path() -> mockito::Matcher {
        mockito::Matcher::Regex(r"^/api/trpc/loggedIn\.timeSeries\.listTimeSeries".into())
    }

    #[tokio::test]
    async fn test_fetch_consumption() {
        let mut server = mockito::Server::new_async().await;
        let points: Vec<_> = (0..24)
            .map(|h| {
                json!({
                    "atUTC": (day().start + Duration::hours(h)).to_rfc3339(),
                    "energy": 0.5,
                    "cost": 0.1
                })
            })
            .collect();
        let body = json!([{ "result": { "data": { "json": [
            { "meteringPointNo": "6000123", "resolution": "HOUR", "series": points }
        ] } } }]);

        let mock = server
            .mock("GET", series_path())
            .match_header("authorization", "Bearer a1")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let samples = client(&server)
            .fetch_consumption(&token(), "6000123", day(), Resolution::Hour)
            .await
            .unwrap();
        assert_eq!(samples.len(), 24);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_window_is_not_ready() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", series_path())
            .with_status(200)
            .with_body(r#"[{"result":{"data":{"json":[]}}}]"#)
            .create_async()
            .await;

        let err = client(&server)
            .fetch_consumption(&token(), "6000123", day(), Resolution::QuarterHour)
            .await
            .unwrap_err();
        match err {
            ApiError::DataNotReady { date, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
            }
            other => panic!("expected DataNotReady, got {other:?}"),
        }
    }

    fn kind(err: &ApiError) -> &'static str {
        match err {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Auth(_) => "auth",
            ApiError::ApiUnavailable(_) => "unavailable",
            ApiError::DataValidation(_) => "validation",
            _ => "other",
        }
    }

    #[tokio::test]
    async fn test_status_mapping() {
        for (status, expected) in [
            (401, "unauthorized"),
            (403, "auth"),
            (400, "validation"),
            (404, "validation"),
            (429, "unavailable"),
            (502, "unavailable"),
        ] {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", series_path())
                .with_status(status)
                .create_async()
                .await;

            let err = client(&server)
                .fetch_consumption(&token(), "6000123", day(), Resolution::Hour)
                .await
                .unwrap_err();
            assert_eq!(kind(&err), expected, "status {status} gave {err:?}");
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let endpoints = Endpoints::for_locale(Locale::Fi).with_api_base("http://127.0.0.1:9");
        let client = ApiClient::new(Arc::new(HttpClient::new().unwrap()), endpoints);

        let err = client
            .fetch_consumption(&token(), "6000123", day(), Resolution::Hour)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ApiUnavailable(_)));
    }

    #[tokio::test]
    async fn test_discover_metering_points() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/auth/session")
            .match_header("authorization", "Bearer a1")
            .with_status(200)
            .with_body(
                json!({ "user": { "customerId": "42", "deliverySites": [
                    { "meteringPointNo": "6000123", "address": "Testikatu 1" }
                ] } })
                .to_string(),
            )
            .create_async()
            .await;

        let points = client(&server).discover_metering_points(&token()).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "6000123");
        assert_eq!(points[0].customer_id.as_deref(), Some("42"));
    }
}
