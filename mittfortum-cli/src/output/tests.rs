//! CLI output formatting tests.
//!
//! These tests verify that CLI output is correctly formatted for both
//! text and JSON output modes.

#[cfg(test)]
mod text_formatter_tests {
    use super::super::json::{StatusReport, TokenOutput};
    use super::super::text::{TextFormatter, format_number};
    use chrono::{NaiveDate, TimeZone, Utc};
    use mittfortum_core::{
        ImportSummary, Locale, MeteringPoint, PollPhase, PollState, Resolution, StatisticKind,
        StatisticMetadata, StatisticPoint, StatisticSeries,
    };
    use mittfortum_sync::TickOutcome;

    fn outcome(phase: PollPhase) -> TickOutcome {
        TickOutcome {
            phase,
            date: NaiveDate::from_ymd_opt(2025, 1, 9),
            retry_count: 0,
            imported: None,
            next_attempt: None,
            error: None,
        }
    }

    fn series(states: &[f64]) -> StatisticSeries {
        let mut series = StatisticSeries::new(StatisticMetadata {
            statistic_id: "mittfortum:energy_consumption".to_string(),
            name: "Energy Consumption".to_string(),
            unit: "kWh".to_string(),
            source: "mittfortum".to_string(),
            resolution: Resolution::Hour,
            kind: StatisticKind::Energy,
            has_sum: true,
        });
        let mut sum = 0.0;
        for (i, state) in states.iter().enumerate() {
            sum += state;
            series.points.push(StatisticPoint {
                start: Utc.with_ymd_and_hms(2025, 1, 9, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i64::try_from(i).unwrap()),
                state: *state,
                sum,
            });
        }
        series
    }

    #[test]
    fn test_bar_boundaries() {
        let formatter = TextFormatter::new(false).with_bar_width(10);

        let test_cases = vec![
            (0.0, "░░░░░░░░░░"),
            (0.25, "███░░░░░░░"),
            (0.5, "█████░░░░░"),
            (1.0, "██████████"),
            (2.0, "██████████"),
        ];

        for (value, expected) in test_cases {
            assert_eq!(formatter.bar(value, 1.0), expected, "Failed for {value}");
        }
    }

    #[test]
    fn test_bar_zero_max() {
        let formatter = TextFormatter::new(false).with_bar_width(4);
        assert_eq!(formatter.bar(3.0, 0.0), "░░░░");
    }

    #[test]
    fn test_bar_colors() {
        let formatter = TextFormatter::new(true).with_bar_width(4);
        assert!(formatter.bar(0.9, 1.0).contains("\x1b[33m"));
        assert!(formatter.bar(0.2, 1.0).contains("\x1b[32m"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(0.1234), "0.123");
    }

    #[test]
    fn test_tick_success() {
        let formatter = TextFormatter::new(false);
        let mut tick = outcome(PollPhase::Success);
        tick.imported = Some(ImportSummary { series: 2, points: 48 });

        let text = formatter.format_tick(&tick, Locale::En);
        assert!(text.starts_with("Up to date"));
        assert!(text.contains("2025-01-09"));
        assert!(text.contains("Imported: 48 / 2"));
        assert!(!text.contains("Retries"));
    }

    #[test]
    fn test_tick_retry() {
        let formatter = TextFormatter::new(false);
        let mut tick = outcome(PollPhase::RetryScheduled);
        tick.retry_count = 3;
        tick.next_attempt = Some(Utc::now());

        let text = formatter.format_tick(&tick, Locale::En);
        assert!(text.starts_with("Waiting for data"));
        assert!(text.contains("Retries: 3"));
        assert!(text.contains("Next poll"));
    }

    #[test]
    fn test_tick_failed_is_red() {
        let formatter = TextFormatter::new(true);
        let mut tick = outcome(PollPhase::Failed);
        tick.error = Some("boom".to_string());

        let text = formatter.format_tick(&tick, Locale::En);
        assert!(text.contains("\x1b[31mFailed"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_tick_translated() {
        let formatter = TextFormatter::new(false);
        let en = formatter.format_tick(&outcome(PollPhase::Success), Locale::En);
        let fi = formatter.format_tick(&outcome(PollPhase::Success), Locale::Fi);
        assert_ne!(en, fi);
    }

    #[test]
    fn test_series() {
        let formatter = TextFormatter::new(false).with_bar_width(4);
        let text = formatter.format_series(&series(&[1.0, 0.5]), chrono_tz::Europe::Helsinki);

        assert!(text.starts_with("Energy Consumption (kWh, hour)"));
        // 00:00 UTC is 02:00 in Helsinki in winter
        assert!(text.contains("2025-01-09 02:00  ████        1"));
        assert!(text.contains("2025-01-09 03:00  ██░░      0.5  1.5"));
    }

    #[test]
    fn test_empty_series() {
        let formatter = TextFormatter::new(false);
        let text = formatter.format_series(&series(&[]), chrono_tz::Europe::Helsinki);
        assert!(text.contains("no points"));
    }

    #[test]
    fn test_points() {
        let formatter = TextFormatter::new(false);
        let points = vec![
            MeteringPoint::new("6000123").with_address("Testikatu 1"),
            MeteringPoint::new("6000456").with_customer_id("42"),
        ];
        let text = formatter.format_points(&points, Locale::En);

        assert!(text.starts_with("Metering points"));
        assert!(text.contains("6000123  Testikatu 1"));
        assert!(text.contains("6000456  42"));
    }

    #[test]
    fn test_status_without_token() {
        let formatter = TextFormatter::new(false);
        let report = StatusReport {
            locale: Locale::En,
            token: None,
            poll: PollState::default(),
            metering_points: Vec::new(),
            series: Vec::new(),
        };
        let text = formatter.format_status(&report);
        assert!(text.contains("MittFortum (EN)"));
        assert!(text.contains("Not logged in"));
        assert!(!text.contains("Pending backfill"));
    }

    #[test]
    fn test_status_pending_backfill() {
        let formatter = TextFormatter::new(false);
        let report = StatusReport {
            locale: Locale::En,
            token: Some(TokenOutput {
                expires_at: Utc::now(),
                expired: false,
                refreshable: true,
            }),
            poll: PollState {
                last_successful_fetch: None,
                pending_backfill_date: NaiveDate::from_ymd_opt(2025, 1, 9),
                retry_count: 2,
            },
            metering_points: vec!["6000123".to_string()],
            series: Vec::new(),
        };
        let text = formatter.format_status(&report);
        assert!(text.contains("Token expires"));
        assert!(text.contains("Pending backfill: 2025-01-09 (Retries: 2)"));
        assert!(text.contains("Metering points: 6000123"));
    }

    #[test]
    fn test_success_line() {
        assert_eq!(TextFormatter::new(false).success("Logged in"), "✓ Logged in");
    }
}

#[cfg(test)]
mod json_formatter_tests {
    use super::super::json::{JsonFormatter, StatusReport};
    use chrono::NaiveDate;
    use mittfortum_core::{Locale, PollPhase, PollState};
    use mittfortum_sync::TickOutcome;

    #[test]
    fn test_format_pretty() {
        let formatter = JsonFormatter::new(true);
        let output = formatter.format(&serde_json::json!({"key": "value"})).unwrap();
        assert!(output.contains('\n'));
    }

    #[test]
    fn test_format_compact() {
        let formatter = JsonFormatter::new(false);
        let output = formatter.format(&serde_json::json!({"key": "value"})).unwrap();
        assert!(!output.contains('\n'));
    }

    #[test]
    fn test_tick_json() {
        let tick = TickOutcome {
            phase: PollPhase::RetryScheduled,
            date: NaiveDate::from_ymd_opt(2025, 1, 9),
            retry_count: 1,
            imported: None,
            next_attempt: None,
            error: None,
        };
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new(false).format(&tick).unwrap()).unwrap();

        assert_eq!(json["date"], "2025-01-09");
        assert_eq!(json["retry_count"], 1);
        assert!(json["imported"].is_null());
    }

    #[test]
    fn test_status_json_has_no_secrets() {
        let report = StatusReport {
            locale: Locale::Sv,
            token: None,
            poll: PollState::default(),
            metering_points: Vec::new(),
            series: Vec::new(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new(false).format(&report).unwrap()).unwrap();

        assert_eq!(json["locale"], "SV");
        assert!(json["token"].is_null());
        assert!(json.get("meteringPoints").is_none());
        assert_eq!(json["poll"]["retry_count"], 0);
    }
}
