//! Time-series and session payload parsing.
//!
//! # Time-Series Response
//!
//! The tRPC batch endpoint wraps the result:
//!
//! ```json
//! [{ "result": { "data": { "json": [
//!     { "meteringPointNo": "6000123",
//!       "resolution": "HOUR",
//!       "series": [
//!         { "atUTC": "2025-01-09T22:00:00.000Z",
//!           "energy": [{ "value": 0.42, "type": "ENERGY" }],
//!           "cost":   [{ "total": 0.05 }] }
//!       ] }
//! ] } } }]
//! ```
//!
//! Field names drift between deployments, so points accept aliases
//! (`atUTC`/`startTime`/`timestamp`, `energy`/`value`/`consumption`,
//! `cost`/`price`) and amounts may be plain numbers, numeric strings, or
//! lists of parts that are summed.

use chrono::{DateTime, Utc};
use mittfortum_core::{
    ConsumptionSample, DEFAULT_ENERGY_UNIT, DateRange, MeteringPoint, Resolution, dedup_samples,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;

// ============================================================================
// Wire Types
// ============================================================================

/// One element of a tRPC batch response.
#[derive(Debug, Deserialize)]
struct BatchItem {
    result: Option<BatchResult>,
    error: Option<BatchError>,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    data: BatchData,
}

#[derive(Debug, Deserialize)]
struct BatchData {
    json: Value,
}

#[derive(Debug, Deserialize)]
struct BatchError {
    json: BatchErrorBody,
}

#[derive(Debug, Deserialize)]
struct BatchErrorBody {
    #[serde(default)]
    message: String,
    data: Option<BatchErrorData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchErrorData {
    code: Option<String>,
    http_status: Option<u16>,
}

/// A series for one metering point.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeries {
    metering_point_no: Option<Value>,
    resolution: Option<String>,
    unit: Option<String>,
    #[serde(alias = "timeSeries", alias = "data", alias = "points", default)]
    series: Vec<WirePoint>,
}

/// One interval.
#[derive(Debug, Deserialize)]
struct WirePoint {
    #[serde(alias = "atUTC", alias = "startTime", alias = "timestamp")]
    at: Option<WireTimestamp>,
    #[serde(alias = "energy", alias = "value", alias = "consumption")]
    amount: Option<Amount>,
    #[serde(alias = "cost", alias = "price")]
    charge: Option<Amount>,
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Text(String),
    Millis(i64),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
    Parts(Vec<AmountPart>),
    Part(AmountPart),
}

#[derive(Debug, Deserialize)]
struct AmountPart {
    #[serde(alias = "total", alias = "amount")]
    value: Option<f64>,
}

impl WireTimestamp {
    fn to_utc(&self) -> Result<DateTime<Utc>, ApiError> {
        match self {
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ApiError::DataValidation(format!("timestamp {s:?}: {e}"))),
            Self::Millis(ms) => DateTime::from_timestamp_millis(*ms)
                .ok_or_else(|| ApiError::DataValidation(format!("timestamp {ms} out of range"))),
        }
    }
}

impl Amount {
    fn total(&self) -> Result<Option<f64>, ApiError> {
        match self {
            Self::Number(n) => Ok(Some(*n)),
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ApiError::DataValidation(format!("amount {s:?} is not a number"))),
            Self::Parts(parts) => {
                let values: Vec<f64> = parts.iter().filter_map(|p| p.value).collect();
                Ok((!values.is_empty()).then(|| values.iter().sum()))
            }
            Self::Part(part) => Ok(part.value),
        }
    }
}

// ============================================================================
// Time Series
// ============================================================================

/// Extracts the payload of the first batch element.
fn unwrap_batch(body: &str) -> Result<Value, ApiError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| ApiError::DataValidation(format!("response is not JSON: {e}")))?;

    let first = match root {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => return Err(ApiError::DataValidation("empty batch response".to_string())),
        other => other,
    };

    let item: BatchItem = serde_json::from_value(first)
        .map_err(|e| ApiError::DataValidation(format!("batch item: {e}")))?;

    if let Some(err) = item.error {
        return Err(batch_error(err.json));
    }
    item.result
        .map(|r| r.data.json)
        .ok_or_else(|| ApiError::DataValidation("batch item has no result".to_string()))
}

fn batch_error(body: BatchErrorBody) -> ApiError {
    let code = body.data.as_ref().and_then(|d| d.code.clone()).unwrap_or_default();
    let status = body.data.as_ref().and_then(|d| d.http_status);
    match (code.as_str(), status) {
        ("UNAUTHORIZED", _) | (_, Some(401)) => ApiError::Unauthorized,
        ("FORBIDDEN", _) | (_, Some(403)) => ApiError::Auth(body.message),
        (_, Some(s)) if s == 429 || s >= 500 => ApiError::ApiUnavailable(body.message),
        ("INTERNAL_SERVER_ERROR" | "TIMEOUT", _) => ApiError::ApiUnavailable(body.message),
        _ => ApiError::DataValidation(format!("{code}: {}", body.message)),
    }
}

fn collect_series(payload: Value) -> Result<Vec<WireSeries>, ApiError> {
    let decode = |v: Value| {
        serde_json::from_value::<WireSeries>(v)
            .map_err(|e| ApiError::DataValidation(format!("time series: {e}")))
    };

    match payload {
        Value::Array(items) => {
            // Either a list of series, or a bare list of points.
            let is_points = items
                .first()
                .and_then(Value::as_object)
                .is_some_and(|o| ["atUTC", "startTime", "timestamp"].iter().any(|k| o.contains_key(*k)));
            if is_points {
                decode(serde_json::json!({ "series": items })).map(|s| vec![s])
            } else {
                items.into_iter().map(decode).collect()
            }
        }
        obj @ Value::Object(_) => decode(obj).map(|s| vec![s]),
        Value::Null => Ok(Vec::new()),
        other => Err(ApiError::DataValidation(format!(
            "unexpected time-series payload: {other}"
        ))),
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a time-series response into validated samples inside `range`.
///
/// Returns an empty vector when the response holds no samples for the
/// window; the caller decides whether that means "not ready".
pub fn parse_time_series(
    body: &str,
    metering_point: &str,
    range: DateRange,
    resolution: Resolution,
) -> Result<Vec<ConsumptionSample>, ApiError> {
    let payload = unwrap_batch(body)?;
    let mut samples = Vec::new();
    let mut outside = 0usize;

    for series in collect_series(payload)? {
        if let Some(id) = series.metering_point_no.as_ref().and_then(id_text) {
            if id != metering_point {
                continue;
            }
        }

        if let Some(name) = &series.resolution {
            match Resolution::from_wire_name(name) {
                Some(r) if r == resolution => {}
                Some(r) => {
                    return Err(ApiError::DataValidation(format!(
                        "requested {resolution} data, got {r}"
                    )));
                }
                None => warn!(resolution = %name, "Unknown resolution name in response"),
            }
        }

        let series_unit = series.unit.as_deref();
        for point in &series.series {
            let start = point
                .at
                .as_ref()
                .ok_or_else(|| ApiError::DataValidation("point without timestamp".to_string()))?
                .to_utc()?;

            let Some(energy) = point.amount.as_ref().map(Amount::total).transpose()?.flatten() else {
                // Not measured yet.
                continue;
            };

            if !range.contains(start) {
                outside += 1;
                continue;
            }

            let unit = point.unit.as_deref().or(series_unit).unwrap_or(DEFAULT_ENERGY_UNIT);
            let mut sample =
                ConsumptionSample::new(metering_point, start, resolution, energy).with_unit(unit);
            if let Some(cost) = point.charge.as_ref().map(Amount::total).transpose()?.flatten() {
                sample = sample.with_cost(cost);
            }

            sample
                .validate()
                .map_err(|e| ApiError::DataValidation(e.to_string()))?;
            samples.push(sample);
        }
    }

    let samples = dedup_samples(samples);
    check_spacing(&samples, resolution)?;

    debug!(
        metering_point = %metering_point,
        resolution = %resolution,
        count = samples.len(),
        outside,
        "Parsed time series"
    );
    Ok(samples)
}

/// Consecutive starts must be whole multiples of the interval apart.
fn check_spacing(samples: &[ConsumptionSample], resolution: Resolution) -> Result<(), ApiError> {
    let Some(interval) = resolution.interval() else {
        return Ok(());
    };
    let step = interval.num_seconds();

    for pair in samples.windows(2) {
        let gap = (pair[1].start - pair[0].start).num_seconds();
        if gap <= 0 || gap % step != 0 {
            return Err(ApiError::DataValidation(format!(
                "{} and {} are not {resolution} apart",
                pair[0].start, pair[1].start
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Session
// ============================================================================

/// Collects every metering point mentioned in a session document.
///
/// Points are found by their `meteringPointNo` key at any depth; an
/// `address` sibling (string or object) and the nearest enclosing
/// `customerId` are attached when present. Order of first appearance is kept.
pub fn parse_session(body: &str) -> Result<Vec<MeteringPoint>, ApiError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| ApiError::DataValidation(format!("session is not JSON: {e}")))?;

    let mut points: Vec<MeteringPoint> = Vec::new();
    walk(&root, None, &mut points);
    Ok(points)
}

fn walk(value: &Value, customer: Option<&str>, out: &mut Vec<MeteringPoint>) {
    match value {
        Value::Object(map) => {
            let own_customer = map
                .get("customerId")
                .and_then(id_text);
            let customer = own_customer.as_deref().or(customer);

            if let Some(id) = map.get("meteringPointNo").and_then(id_text) {
                if !out.iter().any(|p| p.id == id) {
                    let mut point = MeteringPoint::new(id);
                    if let Some(address) = map.get("address").and_then(address_text) {
                        point = point.with_address(address);
                    }
                    if let Some(customer) = customer {
                        point = point.with_customer_id(customer);
                    }
                    out.push(point);
                }
            }

            for child in map.values() {
                walk(child, customer, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk(child, customer, out);
            }
        }
        _ => {}
    }
}

fn address_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => {
            let parts: Vec<&str> = ["streetAddress", "street", "postalCode", "zipCode", "city"]
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_str))
                .filter(|s| !s.trim().is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}

/// Reads the user name from the session-username endpoint.
pub fn parse_username(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => ["username", "name", "userName"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn day() -> DateRange {
        let start = Utc.with_ymd_and_hms(2025, 1, 9, 22, 0, 0).unwrap();
        DateRange::new(start, start + Duration::days(1)).unwrap()
    }

    fn wrap(json: &Value) -> String {
        json!([{ "result": { "data": { "json": json } } }]).to_string()
    }

    #[test]
    fn test_parse_hourly_with_cost_parts() {
        let body = wrap(&json!([{
            "meteringPointNo": "6000123",
            "resolution": "HOUR",
            "series": [
                { "atUTC": "2025-01-09T22:00:00.000Z",
                  "energy": [{ "value": 0.4, "type": "ENERGY" }, { "value": 0.1 }],
                  "cost": [{ "total": 0.05 }] },
                { "atUTC": "2025-01-09T23:00:00.000Z", "energy": 0.3 }
            ]
        }]));

        let samples = parse_time_series(&body, "6000123", day(), Resolution::Hour).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0].energy - 0.5).abs() < 1e-9);
        assert_eq!(samples[0].cost, Some(0.05));
        assert_eq!(samples[1].cost, None);
    }

    #[test]
    fn test_aliases_and_bare_points() {
        let body = wrap(&json!([
            { "startTime": "2025-01-10T00:00:00+02:00", "consumption": "1.25", "price": 0.2 },
            { "timestamp": 1736467200000_i64, "value": 1.0 }
        ]));

        let samples = parse_time_series(&body, "mp", day(), Resolution::Hour).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].start, Utc.with_ymd_and_hms(2025, 1, 9, 22, 0, 0).unwrap());
        assert_eq!(samples[0].cost, Some(0.2));
    }

    #[test]
    fn test_empty_window_is_empty() {
        let body = wrap(&json!([{
            "meteringPointNo": "mp",
            "series": [{ "atUTC": "2025-01-08T22:00:00Z", "energy": 1.0 },
                       { "atUTC": "2025-01-09T22:00:00Z", "energy": null }]
        }]));
        assert!(parse_time_series(&body, "mp", day(), Resolution::Hour).unwrap().is_empty());

        let body = wrap(&json!([]));
        assert!(parse_time_series(&body, "mp", day(), Resolution::Hour).unwrap().is_empty());
    }

    #[test]
    fn test_other_metering_points_ignored() {
        let body = wrap(&json!([
            { "meteringPointNo": "a", "series": [{ "atUTC": "2025-01-09T22:00:00Z", "energy": 1.0 }] },
            { "meteringPointNo": 42, "series": [{ "atUTC": "2025-01-09T22:00:00Z", "energy": 2.0 }] }
        ]));
        let samples = parse_time_series(&body, "42", day(), Resolution::Hour).unwrap();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].energy - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_validation_errors() {
        let negative = wrap(&json!([{ "atUTC": "2025-01-09T22:00:00Z", "energy": -1.0 }]));
        assert!(matches!(
            parse_time_series(&negative, "mp", day(), Resolution::Hour),
            Err(ApiError::DataValidation(_))
        ));

        let bad_time = wrap(&json!([{ "atUTC": "yesterday", "energy": 1.0 }]));
        assert!(parse_time_series(&bad_time, "mp", day(), Resolution::Hour).is_err());

        let misaligned = wrap(&json!([{ "atUTC": "2025-01-09T22:15:00Z", "energy": 1.0 }]));
        assert!(parse_time_series(&misaligned, "mp", day(), Resolution::Hour).is_err());

        let wrong_res = wrap(&json!([{ "resolution": "DAY", "series": [] }]));
        assert!(parse_time_series(&wrong_res, "mp", day(), Resolution::Hour).is_err());

        assert!(parse_time_series("<html>", "mp", day(), Resolution::Hour).is_err());
    }

    #[test]
    fn test_batch_error_mapping() {
        let body = json!([{ "error": { "json": {
            "message": "no session",
            "data": { "code": "UNAUTHORIZED", "httpStatus": 401 }
        } } }])
        .to_string();
        assert!(matches!(
            parse_time_series(&body, "mp", day(), Resolution::Hour),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_parse_session() {
        let body = json!({
            "user": {
                "customerId": "C-1",
                "deliverySites": [
                    { "meteringPointNo": "6000123",
                      "address": { "streetAddress": "Testikatu 1", "city": "Espoo" } },
                    { "consumption": { "meteringPointNo": 6000456, "address": "Gatan 2" } },
                    { "meteringPointNo": "6000123" }
                ]
            }
        })
        .to_string();

        let points = parse_session(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "6000123");
        assert_eq!(points[0].address.as_deref(), Some("Testikatu 1 Espoo"));
        assert_eq!(points[0].customer_id.as_deref(), Some("C-1"));
        assert_eq!(points[1].id, "6000456");
        assert_eq!(points[1].address.as_deref(), Some("Gatan 2"));
    }

    #[test]
    fn test_parse_username() {
        assert_eq!(parse_username(r#"{"username":"Maija"}"#).as_deref(), Some("Maija"));
        assert_eq!(parse_username(r#""Kari""#).as_deref(), Some("Kari"));
        assert_eq!(parse_username("nope"), None);
    }
}
