//! Backfill timing: which day to fetch, when it is published, how long
//! to keep retrying.

use chrono::{DateTime, Days, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Clock skew tolerated between a scheduled retry and the tick that runs it.
pub const RETRY_SLACK_SECS: i64 = 60;

/// Timing rules for the daily backfill.
#[derive(Debug, Clone)]
pub struct BackfillSchedule {
    /// Market time zone.
    pub timezone: Tz,
    /// Local hour at which yesterday's data is normally available.
    pub publication_hour: u32,
    /// Whether fetches before `publication_hour` are skipped.
    pub respect_publication_time: bool,
    /// Delay between not-ready retries.
    pub retry_interval: Duration,
    /// Optional cap on not-ready retries per date.
    pub max_retries: Option<u32>,
}

impl BackfillSchedule {
    /// Defaults for a market time zone: 30 minute retries, no gate, no cap.
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            publication_hour: 15,
            respect_publication_time: false,
            retry_interval: Duration::minutes(30),
            max_retries: None,
        }
    }

    /// Enables the publication gate at `hour` local time.
    #[must_use]
    pub fn with_publication_gate(mut self, hour: u32) -> Self {
        self.publication_hour = hour.min(23);
        self.respect_publication_time = true;
        self
    }

    /// Sets the retry interval.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Caps not-ready retries per date.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Local calendar date of `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// The day to backfill: yesterday, local time.
    pub fn target_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = self.today(now);
        today.checked_sub_days(Days::new(1)).unwrap_or(today)
    }

    /// Whether the backfill for `now`'s target may be fetched.
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        !self.respect_publication_time
            || now.with_timezone(&self.timezone).hour() >= self.publication_hour
    }

    /// Publication instant on `now`'s local day, if it is still ahead.
    pub fn publication_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let naive = self.today(now).and_hms_opt(self.publication_hour, 0, 0)?;
        let at = self
            .timezone
            .from_local_datetime(&naive)
            .earliest()?
            .with_timezone(&Utc);
        (at > now).then_some(at)
    }

    /// When to try again after a not-ready response.
    pub fn next_retry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.retry_interval
    }

    /// Whether a retry scheduled for `at` may run at `now`. Ticks that
    /// arrive up to [`RETRY_SLACK_SECS`] early still count.
    pub fn is_retry_due(&self, now: DateTime<Utc>, at: DateTime<Utc>) -> bool {
        now + Duration::seconds(RETRY_SLACK_SECS) >= at
    }

    /// Whether `retry_count` has used up the cap.
    pub fn retries_exhausted(&self, retry_count: u32) -> bool {
        self.max_retries.is_some_and(|max| retry_count >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helsinki(h: u32, m: u32) -> DateTime<Utc> {
        chrono_tz::Europe::Helsinki
            .with_ymd_and_hms(2025, 1, 10, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_target_is_local_yesterday() {
        let schedule = BackfillSchedule::new(chrono_tz::Europe::Helsinki);
        // 00:30 Helsinki is still 22:30 UTC the day before.
        let now = helsinki(0, 30);
        assert_eq!(schedule.today(now), NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert_eq!(
            schedule.target_date(now),
            NaiveDate::from_ymd_opt(2025, 1, 9).unwrap()
        );
    }

    #[test]
    fn test_publication_gate() {
        let schedule = BackfillSchedule::new(chrono_tz::Europe::Helsinki);
        assert!(schedule.is_published(helsinki(9, 0)));

        let gated = schedule.with_publication_gate(15);
        assert!(!gated.is_published(helsinki(14, 59)));
        assert!(gated.is_published(helsinki(15, 0)));
        assert_eq!(gated.publication_time(helsinki(9, 0)), Some(helsinki(15, 0)));
        assert_eq!(gated.publication_time(helsinki(16, 0)), None);
    }

    #[test]
    fn test_retry_cap() {
        let schedule = BackfillSchedule::new(chrono_tz::Europe::Oslo);
        assert!(!schedule.retries_exhausted(1000));

        let capped = schedule.with_max_retries(Some(3));
        assert!(!capped.retries_exhausted(2));
        assert!(capped.retries_exhausted(3));
        assert_eq!(capped.next_retry(helsinki(14, 0)), helsinki(14, 30));
        assert!(capped.is_retry_due(helsinki(14, 29) + Duration::seconds(30), helsinki(14, 30)));
        assert!(!capped.is_retry_due(helsinki(14, 15), helsinki(14, 30)));
    }
}
