//! Fetch-and-import state machine.
//!
//! Every tick walks `Idle → Fetching → Importing → (Success |
//! RetryScheduled | Failed)`. The target is yesterday's local day; while the
//! provider has not published it, the tick ends in `RetryScheduled` and the
//! retry counter grows. `tick_at` takes `&mut self`, so one poller never
//! runs two cycles at once.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use mittfortum_api::{ApiError, ConsumptionSource};
use mittfortum_core::{
    ConsumptionSample, DateRange, ImportBatch, ImportSummary, IntegrationContext, PollPhase,
    PollState, Resolution, StatisticIds, i18n,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::SyncError;
use crate::importer::{StatisticsImporter, aggregate_hourly};
use crate::schedule::BackfillSchedule;

// ============================================================================
// Outcome & Status
// ============================================================================

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutcome {
    /// Phase the tick ended in.
    pub phase: PollPhase,
    /// Backfill date the tick worked on.
    pub date: Option<NaiveDate>,
    /// Not-ready retries for `date` so far.
    pub retry_count: u32,
    /// What was written, if anything.
    pub imported: Option<ImportSummary>,
    /// Earliest time the backfill is tried again.
    pub next_attempt: Option<DateTime<Utc>>,
    /// Failure message.
    pub error: Option<String>,
}

/// Snapshot of the poller for status output.
#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    /// Current phase.
    pub phase: PollPhase,
    /// Retry bookkeeping.
    pub state: PollState,
    /// Last backfill date imported.
    pub completed_date: Option<NaiveDate>,
    /// Earliest next backfill attempt.
    pub next_attempt: Option<DateTime<Utc>>,
    /// Metering points being polled.
    pub metering_points: Vec<String>,
    /// Last failure message.
    pub last_error: Option<String>,
}

/// Poller options.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Backfill timing.
    pub schedule: BackfillSchedule,
    /// Fixed metering points. Empty means discover from the session.
    pub metering_points: Vec<String>,
    /// Also fetch today's partial hourly data on each tick.
    pub refresh_today: bool,
}

impl PollerSettings {
    /// Defaults for the context's market.
    pub fn for_context(ctx: &IntegrationContext) -> Self {
        Self {
            schedule: BackfillSchedule::new(ctx.locale.timezone()),
            metering_points: Vec::new(),
            refresh_today: true,
        }
    }
}

/// Data fetched for one metering point.
#[derive(Default)]
struct Fetched {
    samples: Vec<ConsumptionSample>,
    backfill_ready: bool,
}

// ============================================================================
// Poller
// ============================================================================

/// Drives a [`ConsumptionSource`] into the context's statistics sink.
pub struct Poller {
    source: Arc<dyn ConsumptionSource>,
    ctx: IntegrationContext,
    settings: PollerSettings,
    importer: StatisticsImporter,
    state: PollState,
    phase: PollPhase,
    metering_points: Option<Vec<String>>,
    completed_date: Option<NaiveDate>,
    next_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("ctx", &self.ctx)
            .field("phase", &self.phase)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Creates a poller with fresh state.
    pub fn new(
        source: Arc<dyn ConsumptionSource>,
        ctx: IntegrationContext,
        settings: PollerSettings,
    ) -> Self {
        let metering_points =
            (!settings.metering_points.is_empty()).then(|| settings.metering_points.clone());
        Self {
            source,
            importer: StatisticsImporter::new(ctx.locale),
            ctx,
            settings,
            state: PollState::new(),
            phase: PollPhase::Idle,
            metering_points,
            completed_date: None,
            next_attempt: None,
            last_error: None,
        }
    }

    /// Resumes from state persisted by an earlier run.
    #[must_use]
    pub fn with_state(mut self, state: PollState) -> Self {
        self.state = state;
        self
    }

    /// Retry bookkeeping.
    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Phase of the last tick.
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Snapshot for status output.
    pub fn status(&self) -> PollerStatus {
        PollerStatus {
            phase: self.phase,
            state: self.state.clone(),
            completed_date: self.completed_date,
            next_attempt: self.next_attempt,
            metering_points: self.metering_points.clone().unwrap_or_default(),
            last_error: self.last_error.clone(),
        }
    }

    /// Runs one cycle at the current time.
    pub async fn tick(&mut self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    /// Runs one cycle as if the clock read `now`.
    #[instrument(skip(self), fields(retry_count = self.state.retry_count))]
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let schedule = self.settings.schedule.clone();
        let target = schedule.target_date(now);

        let backfill_due = self.prepare_backfill(&schedule, target, now);
        if let Some(outcome) = self.gate(&schedule, target, now, backfill_due) {
            return outcome;
        }
        let backfill = backfill_due.then_some(target);

        self.phase = PollPhase::Fetching;
        let fetched = match self.fetch(backfill, schedule.today(now)).await {
            Ok(fetched) => fetched,
            Err(err) => return self.fail(err, backfill, now),
        };

        self.phase = PollPhase::Importing;
        let imported = match self.import(fetched.samples).await {
            Ok(summary) => summary,
            Err(err) => return self.fail(err, backfill, now),
        };

        match backfill {
            Some(date) if !fetched.backfill_ready => {
                let retry_count = self.state.record_not_ready();
                let next = schedule.next_retry(now);
                self.next_attempt = Some(next);
                info!(date = %date, retry_count, next_attempt = %next, "Data not ready, retry scheduled");
                if schedule.retries_exhausted(retry_count) {
                    warn!(date = %date, retry_count, "Retry limit reached for date");
                }
                self.finish(PollPhase::RetryScheduled, backfill, imported, None)
            }
            Some(date) => {
                info!(date = %date, "Backfill complete");
                self.state.record_success(now);
                self.completed_date = Some(date);
                self.next_attempt = None;
                self.mark_available(true, None);
                self.finish(PollPhase::Success, backfill, imported, None)
            }
            None => {
                if imported.is_some() {
                    self.state.last_successful_fetch = Some(now);
                }
                match self.state.pending_backfill_date {
                    // Only today was refreshed; the backfill is still waiting.
                    Some(pending) => {
                        self.finish(PollPhase::RetryScheduled, Some(pending), imported, None)
                    }
                    None => {
                        self.mark_available(true, None);
                        self.finish(PollPhase::Success, None, imported, None)
                    }
                }
            }
        }
    }

    /// Moves the pending date to `target`. Returns whether it still needs fetching.
    fn prepare_backfill(
        &mut self,
        schedule: &BackfillSchedule,
        target: NaiveDate,
        now: DateTime<Utc>,
    ) -> bool {
        if self.completed_date == Some(target) {
            return false;
        }
        if let Some(abandoned) = self.state.set_pending(target) {
            warn!(
                date = %abandoned,
                new_date = %target,
                "Abandoning backfill date that never became available"
            );
            self.next_attempt = None;
        }
        if self.next_attempt.is_some_and(|at| !schedule.is_retry_due(now, at)) {
            debug!(date = %target, "Backfill retry not due yet");
            return false;
        }
        !schedule.retries_exhausted(self.state.retry_count)
    }

    /// Ends the tick early when the backfill is gated or capped.
    fn gate(
        &mut self,
        schedule: &BackfillSchedule,
        target: NaiveDate,
        now: DateTime<Utc>,
        backfill_due: bool,
    ) -> Option<TickOutcome> {
        let pending = self.state.pending_backfill_date == Some(target);
        if pending && schedule.retries_exhausted(self.state.retry_count) {
            let message = format!(
                "gave up on {target} after {} retries",
                self.state.retry_count
            );
            return Some(self.finish(PollPhase::Failed, Some(target), None, Some(message)));
        }
        if backfill_due && !schedule.is_published(now) {
            debug!(date = %target, "Before publication time, skipping backfill");
            self.next_attempt = schedule.publication_time(now);
            return Some(self.finish(PollPhase::RetryScheduled, Some(target), None, None));
        }
        if pending && !backfill_due && !self.settings.refresh_today {
            return Some(self.finish(PollPhase::RetryScheduled, Some(target), None, None));
        }
        None
    }

    async fn resolve_metering_points(&mut self) -> Result<Vec<String>, SyncError> {
        if let Some(points) = &self.metering_points {
            return Ok(points.clone());
        }
        let discovered: Vec<String> = self
            .source
            .discover_metering_points()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if discovered.is_empty() {
            return Err(ApiError::DataValidation("session lists no metering points".into()).into());
        }
        info!(count = discovered.len(), "Using discovered metering points");
        self.metering_points = Some(discovered.clone());
        Ok(discovered)
    }

    async fn fetch(
        &mut self,
        backfill: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Fetched, SyncError> {
        self.source.ensure_authorized().await?;
        let points = self.resolve_metering_points().await?;
        let tz = self.ctx.locale.timezone();

        let mut fetched = Fetched {
            samples: Vec::new(),
            backfill_ready: true,
        };
        for mp in &points {
            if let Some(date) = backfill {
                let range = DateRange::for_local_day(date, tz)?;
                let (samples, ready) = self.fetch_day(mp, range).await?;
                fetched.samples.extend(samples);
                fetched.backfill_ready &= ready;
            }
            if self.settings.refresh_today {
                let range = DateRange::for_local_day(today, tz)?;
                match self.source.fetch_consumption(mp, range, Resolution::Hour).await {
                    Ok(samples) => fetched.samples.extend(samples),
                    Err(err) if err.is_not_ready() => {
                        debug!(metering_point = %mp, "No data for today yet");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(fetched)
    }

    /// Fetches both resolutions of one day. The day counts as ready only once
    /// its quarter-hour data is published; hourly data alone is imported but
    /// keeps the date pending.
    async fn fetch_day(
        &self,
        metering_point: &str,
        range: DateRange,
    ) -> Result<(Vec<ConsumptionSample>, bool), SyncError> {
        let (hourly, quarters) = futures::future::join(
            self.source
                .fetch_consumption(metering_point, range, Resolution::Hour),
            self.source
                .fetch_consumption(metering_point, range, Resolution::QuarterHour),
        )
        .await;
        let hourly = not_ready_as_none(hourly)?;
        let quarters = not_ready_as_none(quarters)?;

        Ok(match (hourly, quarters) {
            (None, None) => (Vec::new(), false),
            (Some(hourly), None) => {
                debug!(metering_point = %metering_point, "Quarter-hour data not published yet");
                (hourly, false)
            }
            (Some(mut hourly), Some(quarters)) => {
                hourly.extend(quarters);
                (hourly, true)
            }
            (None, Some(quarters)) => {
                let mut derived = aggregate_hourly(&quarters);
                debug!(
                    metering_point = %metering_point,
                    hours = derived.len(),
                    "Derived hourly data from quarter-hours"
                );
                derived.extend(quarters);
                (derived, true)
            }
        })
    }

    fn ids_for(&self, metering_point: &str) -> StatisticIds {
        let multiple = self.metering_points.as_ref().is_some_and(|p| p.len() > 1);
        if multiple {
            self.ctx.statistic_ids.scoped(metering_point)
        } else {
            self.ctx.statistic_ids.clone()
        }
    }

    /// Writes everything fetched in one atomic import.
    async fn import(
        &self,
        samples: Vec<ConsumptionSample>,
    ) -> Result<Option<ImportSummary>, SyncError> {
        if samples.is_empty() {
            return Ok(None);
        }

        let mut by_point: std::collections::BTreeMap<String, Vec<ConsumptionSample>> =
            std::collections::BTreeMap::new();
        for sample in samples {
            by_point
                .entry(sample.metering_point.clone())
                .or_default()
                .push(sample);
        }

        let mut batch = ImportBatch::new();
        for (mp, samples) in by_point {
            let ids = self.ids_for(&mp);
            self.importer
                .append(&mut batch, self.ctx.statistics.as_ref(), &ids, samples)
                .await?;
        }
        if batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.ctx.statistics.import(&batch).await?))
    }

    fn fail(&mut self, err: SyncError, date: Option<NaiveDate>, now: DateTime<Utc>) -> TickOutcome {
        let message = err.to_string();
        if err.is_transient() {
            warn!(error = %message, "Provider unavailable, retrying next tick");
            return self.finish(PollPhase::RetryScheduled, date, None, Some(message));
        }

        let reason = i18n::translate(self.ctx.locale, err.i18n_key());
        if err.requires_reauth() {
            warn!(error = %message, "Authorization lost");
            self.ctx
                .availability
                .reauth_required(&i18n::translate(self.ctx.locale, "status.reauth_required"));
        } else {
            warn!(error = %message, at = %now, "Poll cycle failed");
        }
        self.mark_available(false, Some(&reason));
        self.finish(PollPhase::Failed, date, None, Some(message))
    }

    fn mark_available(&self, available: bool, reason: Option<&str>) {
        let points = self.metering_points.clone().unwrap_or_default();
        let id_sets: Vec<StatisticIds> = if points.len() > 1 {
            points.iter().map(|mp| self.ids_for(mp)).collect()
        } else {
            vec![self.ctx.statistic_ids.clone()]
        };
        for ids in id_sets {
            for id in ids.all() {
                self.ctx.availability.set_available(&id, available, reason);
            }
        }
    }

    fn finish(
        &mut self,
        phase: PollPhase,
        date: Option<NaiveDate>,
        imported: Option<ImportSummary>,
        error: Option<String>,
    ) -> TickOutcome {
        self.phase = phase;
        self.last_error.clone_from(&error);
        TickOutcome {
            phase,
            date,
            retry_count: self.state.retry_count,
            imported,
            next_attempt: self.next_attempt,
            error,
        }
    }
}

fn not_ready_as_none(
    result: Result<Vec<ConsumptionSample>, ApiError>,
) -> Result<Option<Vec<ConsumptionSample>>, SyncError> {
    match result {
        Ok(samples) if samples.is_empty() => Ok(None),
        Ok(samples) => Ok(Some(samples)),
        Err(err) if err.is_not_ready() => Ok(None),
        Err(err) => Err(err.into()),
    }
}
