//! Serde format tests for core types.
//!
//! These pin down the JSON shapes that end up in secret stores and CLI output.

use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::{
    ConsumptionSample, Locale, MeteringPoint, PollPhase, PollState, Resolution, StatisticKind,
    TokenSet,
};

// ============================================================================
// TokenSet
// ============================================================================

#[test]
fn test_token_set_omits_missing_id_token() {
    let expires = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
    let token = TokenSet::new("access", "refresh", expires);
    let value = serde_json::to_value(&token).unwrap();

    assert_eq!(value["access_token"], "access");
    assert_eq!(value["refresh_token"], "refresh");
    assert_eq!(value["expires_at"], "2025-01-10T12:00:00Z");
    assert!(value.get("id_token").is_none());
}

#[test]
fn test_token_set_accepts_stored_form() {
    let stored = json!({
        "access_token": "a",
        "refresh_token": "r",
        "expires_at": "2025-01-10T12:00:00Z",
        "id_token": "header.payload.sig"
    });
    let token: TokenSet = serde_json::from_value(stored).unwrap();
    assert_eq!(token.id_token.as_deref(), Some("header.payload.sig"));
}

// ============================================================================
// Samples & Metering Points
// ============================================================================

#[test]
fn test_sample_without_cost() {
    let start = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
    let sample = ConsumptionSample::new("643007", start, Resolution::QuarterHour, 0.42);
    let value = serde_json::to_value(&sample).unwrap();

    assert_eq!(value["resolution"], "quarter_hour");
    assert_eq!(value["unit"], "kWh");
    assert!(value.get("cost").is_none());
}

#[test]
fn test_metering_point_minimal_form() {
    let mp: MeteringPoint = serde_json::from_value(json!({"id": "643007"})).unwrap();
    assert_eq!(mp, MeteringPoint::new("643007"));
    assert!(mp.validate().is_ok());
    assert!(MeteringPoint::new("64 3007").validate().is_err());
}

// ============================================================================
// Enums
// ============================================================================

#[test]
fn test_enum_wire_forms() {
    assert_eq!(
        serde_json::to_string(&PollPhase::RetryScheduled).unwrap(),
        r#""retry_scheduled""#
    );
    assert_eq!(serde_json::to_string(&StatisticKind::Cost).unwrap(), r#""cost""#);
    assert_eq!(serde_json::to_string(&Locale::Fi).unwrap(), r#""FI""#);
    assert!(serde_json::from_str::<Locale>(r#""DE""#).is_err());
}

#[test]
fn test_poll_state_default_shape() {
    let value = serde_json::to_value(PollState::default()).unwrap();
    assert_eq!(
        value,
        json!({
            "last_successful_fetch": null,
            "pending_backfill_date": null,
            "retry_count": 0
        })
    );
}
