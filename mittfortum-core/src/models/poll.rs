//! Poller state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the poll cycle.
///
/// `Idle → Fetching → Importing → (Success | RetryScheduled | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    /// No cycle has run yet.
    #[default]
    Idle,
    /// Requesting data from the provider.
    Fetching,
    /// Writing statistics to the sink.
    Importing,
    /// Last cycle imported the backfill day.
    Success,
    /// Data not yet available, or a transient fault; the next tick retries.
    RetryScheduled,
    /// Unrecoverable for this cycle: auth exhausted or malformed payload.
    Failed,
}

impl PollPhase {
    /// Returns true for the phases a cycle ends in.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::RetryScheduled | Self::Failed)
    }

    /// Translation key for this phase.
    pub fn i18n_key(&self) -> &'static str {
        match self {
            Self::Idle => "phase.idle",
            Self::Fetching => "phase.fetching",
            Self::Importing => "phase.importing",
            Self::Success => "phase.success",
            Self::RetryScheduled => "phase.retry_scheduled",
            Self::Failed => "phase.failed",
        }
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Importing => "importing",
            Self::Success => "success",
            Self::RetryScheduled => "retry_scheduled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Drives the retry-until-available policy for the previous day's data.
///
/// Serializable so the CLI can keep it between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
    /// When a backfill last imported successfully.
    pub last_successful_fetch: Option<DateTime<Utc>>,
    /// Local date still waiting for complete data.
    pub pending_backfill_date: Option<NaiveDate>,
    /// Consecutive not-ready results for the pending date.
    pub retry_count: u32,
}

impl PollState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `date` as pending. Returns the date it displaced, if different.
    ///
    /// Switching dates resets `retry_count`.
    pub fn set_pending(&mut self, date: NaiveDate) -> Option<NaiveDate> {
        match self.pending_backfill_date {
            Some(current) if current == date => None,
            previous => {
                self.pending_backfill_date = Some(date);
                self.retry_count = 0;
                previous
            }
        }
    }

    /// Records a not-ready result and returns the new count.
    pub fn record_not_ready(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }

    /// Records a successful import at `now`.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_successful_fetch = Some(now);
        self.pending_backfill_date = None;
        self.retry_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_count_increments_and_resets() {
        let mut state = PollState::new();
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(state.set_pending(date), None);
        assert_eq!(state.record_not_ready(), 1);
        assert_eq!(state.record_not_ready(), 2);

        // Same date keeps the count.
        assert_eq!(state.set_pending(date), None);
        assert_eq!(state.retry_count, 2);

        state.record_success(Utc::now());
        assert_eq!(state.retry_count, 0);
        assert!(state.pending_backfill_date.is_none());
        assert!(state.last_successful_fetch.is_some());
    }

    #[test]
    fn test_new_date_displaces_old() {
        let mut state = PollState::new();
        let d1 = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        state.set_pending(d1);
        state.record_not_ready();
        assert_eq!(state.set_pending(d2), Some(d1));
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.pending_backfill_date, Some(d2));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!PollPhase::Idle.is_terminal());
        assert!(!PollPhase::Fetching.is_terminal());
        assert!(PollPhase::RetryScheduled.is_terminal());
        assert!(PollPhase::Failed.is_terminal());
    }
}
