//! End-to-end poller scenarios against a scripted provider.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use mittfortum_api::{ApiError, ConsumptionSource};
use mittfortum_core::{
    AvailabilityNotifier, ConsumptionSample, DateRange, IntegrationContext, Locale,
    MeteringPoint, PollPhase, Resolution, StatisticsSink,
};
use mittfortum_store::{MemoryStatistics, MemoryTokenStore, SqliteStatistics};
use mittfortum_sync::{BackfillSchedule, Poller, PollerSettings};

// ============================================================================
// Fakes
// ============================================================================

/// Provider whose published days and failures are set by the test.
#[derive(Default)]
struct ScriptedSource {
    published: Mutex<HashSet<NaiveDate>>,
    resolutions: Mutex<Vec<Resolution>>,
    auth_error: Mutex<Option<fn() -> ApiError>>,
    fetch_error: Mutex<Option<fn() -> ApiError>>,
    metering_points: Vec<String>,
    calls: Mutex<Vec<(String, NaiveDate, Resolution)>>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            resolutions: Mutex::new(vec![Resolution::Hour, Resolution::QuarterHour]),
            metering_points: vec!["6000123".to_string()],
            ..Self::default()
        }
    }

    fn with_points(points: &[&str]) -> Self {
        Self {
            metering_points: points.iter().map(|p| (*p).to_string()).collect(),
            ..Self::new()
        }
    }

    fn publish(&self, date: NaiveDate) {
        self.published.lock().unwrap().insert(date);
    }

    fn only(&self, resolution: Resolution) {
        *self.resolutions.lock().unwrap() = vec![resolution];
    }

    fn fail_auth(&self, err: fn() -> ApiError) {
        *self.auth_error.lock().unwrap() = Some(err);
    }

    fn fail_fetch(&self, err: Option<fn() -> ApiError>) {
        *self.fetch_error.lock().unwrap() = err;
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&chrono_tz::Europe::Helsinki).date_naive()
}

#[async_trait]
impl ConsumptionSource for ScriptedSource {
    async fn ensure_authorized(&self) -> Result<(), ApiError> {
        match *self.auth_error.lock().unwrap() {
            Some(err) => Err(err()),
            None => Ok(()),
        }
    }

    async fn fetch_consumption(
        &self,
        metering_point: &str,
        range: DateRange,
        resolution: Resolution,
    ) -> Result<Vec<ConsumptionSample>, ApiError> {
        let date = local_date(range.start);
        self.calls
            .lock()
            .unwrap()
            .push((metering_point.to_string(), date, resolution));

        if let Some(err) = *self.fetch_error.lock().unwrap() {
            return Err(err());
        }
        let not_ready = || ApiError::DataNotReady {
            metering_point: metering_point.to_string(),
            date,
        };
        if !self.published.lock().unwrap().contains(&date)
            || !self.resolutions.lock().unwrap().contains(&resolution)
        {
            return Err(not_ready());
        }

        let step = resolution.interval().unwrap_or(Duration::hours(1));
        let per_hour = (Duration::hours(1).num_minutes() / step.num_minutes()) as f64;
        let mut samples = Vec::new();
        let mut start = range.start;
        while start < range.end {
            samples.push(
                ConsumptionSample::new(metering_point, start, resolution, 1.0 / per_hour)
                    .with_cost(0.2 / per_hour),
            );
            start += step;
        }
        Ok(samples)
    }

    async fn discover_metering_points(&self) -> Result<Vec<MeteringPoint>, ApiError> {
        Ok(self
            .metering_points
            .iter()
            .map(|id| MeteringPoint::new(id.clone()))
            .collect())
    }
}

/// Records availability changes.
#[derive(Default)]
struct RecordingAvailability {
    changes: Mutex<HashMap<String, bool>>,
    reauth: Mutex<u32>,
}

impl AvailabilityNotifier for RecordingAvailability {
    fn set_available(&self, entity_id: &str, available: bool, _reason: Option<&str>) {
        self.changes
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), available);
    }

    fn reauth_required(&self, _reason: &str) {
        *self.reauth.lock().unwrap() += 1;
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    source: Arc<ScriptedSource>,
    sink: Arc<MemoryStatistics>,
    availability: Arc<RecordingAvailability>,
    poller: Poller,
}

fn harness(source: ScriptedSource, tune: impl FnOnce(&mut PollerSettings)) -> Harness {
    harness_with_sink(source, Arc::new(MemoryStatistics::new()), tune)
}

fn harness_with_sink(
    source: ScriptedSource,
    sink: Arc<MemoryStatistics>,
    tune: impl FnOnce(&mut PollerSettings),
) -> Harness {
    let source = Arc::new(source);
    let availability = Arc::new(RecordingAvailability::default());
    let ctx = IntegrationContext::builder()
        .locale(Locale::Fi)
        .secrets(Arc::new(MemoryTokenStore::new()))
        .statistics(sink.clone())
        .availability(availability.clone())
        .build()
        .unwrap();

    let mut settings = PollerSettings::for_context(&ctx);
    tune(&mut settings);
    let poller = Poller::new(source.clone(), ctx, settings);
    Harness {
        source,
        sink,
        availability,
        poller,
    }
}

/// Helsinki wall-clock time on 2025-01-10.
fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    chrono_tz::Europe::Helsinki
        .with_ymd_and_hms(2025, 1, 10, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn yesterday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 9).unwrap()
}

const HOURLY: &str = "mittfortum:energy_consumption";
const QUARTERLY: &str = "mittfortum:energy_consumption_15min";

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn retries_until_published_then_imports() {
    let mut h = harness(ScriptedSource::new(), |_| {});

    let mut counts = Vec::new();
    for (hour, minute) in [(14, 0), (14, 30), (15, 0)] {
        let outcome = h.poller.tick_at(at(hour, minute)).await;
        assert_eq!(outcome.phase, PollPhase::RetryScheduled);
        assert_eq!(outcome.date, Some(yesterday()));
        assert_eq!(outcome.next_attempt, Some(at(hour, minute) + Duration::minutes(30)));
        counts.push(outcome.retry_count);
    }
    assert_eq!(counts, vec![1, 2, 3]);
    assert!(h.sink.series(HOURLY, None).await.unwrap().is_empty());

    // Published at 15:10.
    h.source.publish(yesterday());
    let outcome = h.poller.tick_at(at(15, 30)).await;

    assert_eq!(outcome.phase, PollPhase::Success);
    assert_eq!(outcome.retry_count, 0);
    assert!(outcome.imported.is_some());
    assert_eq!(h.poller.state().pending_backfill_date, None);
    assert_eq!(h.poller.state().last_successful_fetch, Some(at(15, 30)));

    assert_eq!(h.sink.series(HOURLY, None).await.unwrap().len(), 24);
    assert_eq!(h.sink.series(QUARTERLY, None).await.unwrap().len(), 96);
    assert_eq!(h.availability.changes.lock().unwrap().get(HOURLY), Some(&true));
}

#[tokio::test]
async fn retry_waits_for_interval() {
    let mut h = harness(ScriptedSource::new(), |_| {});
    h.poller.tick_at(at(14, 0)).await;
    let calls = h.source.call_count();

    let outcome = h.poller.tick_at(at(14, 10)).await;
    assert_eq!(outcome.phase, PollPhase::RetryScheduled);
    assert_eq!(outcome.retry_count, 1);
    // Only today's refresh ran.
    assert_eq!(h.source.call_count(), calls + 1);
}

#[tokio::test]
async fn completed_day_is_not_fetched_again() {
    let source = ScriptedSource::new();
    source.publish(yesterday());
    let mut h = harness(source, |_| {});

    assert_eq!(h.poller.tick_at(at(16, 0)).await.phase, PollPhase::Success);
    let outcome = h.poller.tick_at(at(16, 30)).await;
    assert_eq!(outcome.phase, PollPhase::Success);
    assert_eq!(outcome.date, None);

    let backfill_calls = h
        .source
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, date, _)| *date == yesterday())
        .count();
    assert_eq!(backfill_calls, 2);
}

#[tokio::test]
async fn reimport_is_idempotent() {
    let sink = Arc::new(MemoryStatistics::new());
    for _ in 0..2 {
        let source = ScriptedSource::new();
        source.publish(yesterday());
        let mut h = harness_with_sink(source, sink.clone(), |_| {});
        assert_eq!(h.poller.tick_at(at(16, 0)).await.phase, PollPhase::Success);
    }

    let points = sink.series(HOURLY, None).await.unwrap();
    assert_eq!(points.len(), 24);
    assert!((points.last().unwrap().sum - 24.0).abs() < 1e-9);
    let quarters = sink.series(QUARTERLY, None).await.unwrap();
    assert_eq!(quarters.len(), 96);
    assert!((quarters.last().unwrap().sum - 24.0).abs() < 1e-9);
}

#[tokio::test]
async fn hourly_only_keeps_backfill_pending_until_quarter_hours_arrive() {
    let source = ScriptedSource::new();
    source.publish(yesterday());
    source.only(Resolution::Hour);
    let mut h = harness(source, |_| {});

    let outcome = h.poller.tick_at(at(15, 0)).await;
    assert_eq!(outcome.phase, PollPhase::RetryScheduled);
    assert_eq!(outcome.retry_count, 1);
    assert!(outcome.imported.is_some());
    assert_eq!(h.poller.state().pending_backfill_date, Some(yesterday()));
    assert_eq!(h.sink.series(HOURLY, None).await.unwrap().len(), 24);
    assert!(h.sink.series(QUARTERLY, None).await.unwrap().is_empty());

    // Quarter-hours are published before the next retry.
    *h.source.resolutions.lock().unwrap() = vec![Resolution::Hour, Resolution::QuarterHour];
    let outcome = h.poller.tick_at(at(15, 30)).await;
    assert_eq!(outcome.phase, PollPhase::Success);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(h.poller.state().pending_backfill_date, None);

    let hourly = h.sink.series(HOURLY, None).await.unwrap();
    assert_eq!(hourly.len(), 24);
    assert!((hourly.last().unwrap().sum - 24.0).abs() < 1e-9);
    assert_eq!(h.sink.series(QUARTERLY, None).await.unwrap().len(), 96);
}

#[tokio::test]
async fn quarter_hour_only_fills_hourly_by_aggregation() {
    let source = ScriptedSource::new();
    source.publish(yesterday());
    source.only(Resolution::QuarterHour);
    let mut h = harness(source, |_| {});

    assert_eq!(h.poller.tick_at(at(16, 0)).await.phase, PollPhase::Success);
    let quarters = h.sink.series(QUARTERLY, None).await.unwrap();
    let hourly = h.sink.series(HOURLY, None).await.unwrap();
    assert_eq!(quarters.len(), 96);
    assert_eq!(hourly.len(), 24);
    assert!((hourly[0].state - 1.0).abs() < 1e-9);
    assert!(quarters.iter().all(|p| (p.state - 0.25).abs() < 1e-9));
}

#[tokio::test]
async fn publication_gate_skips_early_ticks() {
    let source = ScriptedSource::new();
    source.publish(yesterday());
    let mut h = harness(source, |s| {
        s.schedule = BackfillSchedule::new(chrono_tz::Europe::Helsinki).with_publication_gate(15);
    });

    let outcome = h.poller.tick_at(at(14, 0)).await;
    assert_eq!(outcome.phase, PollPhase::RetryScheduled);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(outcome.next_attempt, Some(at(15, 0)));
    assert_eq!(h.source.call_count(), 0);

    assert_eq!(h.poller.tick_at(at(15, 0)).await.phase, PollPhase::Success);
}

#[tokio::test]
async fn stale_date_is_abandoned_when_day_rolls_over() {
    let mut h = harness(ScriptedSource::new(), |s| s.refresh_today = false);

    assert_eq!(h.poller.tick_at(at(22, 0)).await.retry_count, 1);
    assert_eq!(h.poller.tick_at(at(22, 30)).await.retry_count, 2);

    // 00:30 on the 11th: the target moves to the 10th.
    let outcome = h.poller.tick_at(at(22, 30) + Duration::hours(2)).await;
    assert_eq!(outcome.date, NaiveDate::from_ymd_opt(2025, 1, 10));
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(
        h.poller.state().pending_backfill_date,
        NaiveDate::from_ymd_opt(2025, 1, 10)
    );
}

#[tokio::test]
async fn retry_cap_fails_without_fetching() {
    let mut h = harness(ScriptedSource::new(), |s| {
        s.refresh_today = false;
        s.schedule = BackfillSchedule::new(chrono_tz::Europe::Helsinki).with_max_retries(Some(2));
    });

    h.poller.tick_at(at(14, 0)).await;
    h.poller.tick_at(at(14, 30)).await;
    let calls = h.source.call_count();

    let outcome = h.poller.tick_at(at(15, 0)).await;
    assert_eq!(outcome.phase, PollPhase::Failed);
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(h.source.call_count(), calls);
}

#[tokio::test]
async fn auth_failure_requires_reauth() {
    let source = ScriptedSource::new();
    source.fail_auth(|| ApiError::AuthExpired("invalid_grant".into()));
    let mut h = harness(source, |_| {});

    let outcome = h.poller.tick_at(at(16, 0)).await;
    assert_eq!(outcome.phase, PollPhase::Failed);
    assert!(outcome.error.unwrap().contains("invalid_grant"));
    assert_eq!(*h.availability.reauth.lock().unwrap(), 1);
    assert_eq!(h.availability.changes.lock().unwrap().get(HOURLY), Some(&false));
    assert_eq!(h.source.call_count(), 0);
}

#[tokio::test]
async fn unavailable_api_keeps_retry_count() {
    let source = ScriptedSource::new();
    source.fail_fetch(Some(|| ApiError::ApiUnavailable("503".into())));
    let mut h = harness(source, |_| {});

    let outcome = h.poller.tick_at(at(16, 0)).await;
    assert_eq!(outcome.phase, PollPhase::RetryScheduled);
    assert_eq!(outcome.retry_count, 0);
    assert!(h.availability.changes.lock().unwrap().is_empty());

    h.source.fail_fetch(None);
    h.source.publish(yesterday());
    assert_eq!(h.poller.tick_at(at(16, 30)).await.phase, PollPhase::Success);
}

#[tokio::test]
async fn malformed_data_fails_cycle_without_writing() {
    let source = ScriptedSource::new();
    source.fail_fetch(Some(|| ApiError::DataValidation("bad timestamp".into())));
    let mut h = harness(source, |_| {});

    let outcome = h.poller.tick_at(at(16, 0)).await;
    assert_eq!(outcome.phase, PollPhase::Failed);
    assert_eq!(*h.availability.reauth.lock().unwrap(), 0);
    assert!(h.sink.imports().await.is_empty());
}

#[tokio::test]
async fn multiple_metering_points_get_scoped_ids() {
    let source = ScriptedSource::with_points(&["6000123", "6000456"]);
    source.publish(yesterday());
    let mut h = harness(source, |_| {});

    let outcome = h.poller.tick_at(at(16, 0)).await;
    assert_eq!(outcome.phase, PollPhase::Success);
    assert_eq!(h.sink.imports().await.len(), 1);

    let ids = h.sink.statistic_ids().await;
    assert!(ids.contains(&"mittfortum:energy_consumption_6000123".to_string()));
    assert!(ids.contains(&"mittfortum:energy_consumption_15min_6000456".to_string()));
    assert!(!ids.contains(&HOURLY.to_string()));
}

#[tokio::test]
async fn todays_partial_data_is_imported() {
    let source = ScriptedSource::new();
    source.publish(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
    let mut h = harness(source, |_| {});

    let outcome = h.poller.tick_at(at(14, 0)).await;
    // Yesterday is still missing, today's hours were written.
    assert_eq!(outcome.phase, PollPhase::RetryScheduled);
    assert!(outcome.imported.is_some());
    assert_eq!(h.sink.series(HOURLY, None).await.unwrap().len(), 24);
}

#[tokio::test]
async fn sqlite_sink_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statistics.sqlite3");

    {
        let source = Arc::new(ScriptedSource::new());
        source.publish(yesterday());
        let ctx = IntegrationContext::builder()
            .locale(Locale::Fi)
            .secrets(Arc::new(MemoryTokenStore::new()))
            .statistics(Arc::new(SqliteStatistics::open(&path).unwrap()))
            .build()
            .unwrap();
        let settings = PollerSettings::for_context(&ctx);
        let mut poller = Poller::new(source, ctx, settings);
        assert_eq!(poller.tick_at(at(16, 0)).await.phase, PollPhase::Success);
    }

    let store = SqliteStatistics::open(&path).unwrap();
    let summaries = store.summaries().await.unwrap();
    let hourly = summaries
        .iter()
        .find(|s| s.metadata.statistic_id == HOURLY)
        .unwrap();
    assert_eq!(hourly.points, 24);
    assert!((hourly.last_sum.unwrap() - 24.0).abs() < 1e-9);
    assert_eq!(hourly.metadata.unit, "kWh");
}
