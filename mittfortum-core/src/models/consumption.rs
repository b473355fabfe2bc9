//! Consumption samples, resolutions and date ranges.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Unit used for energy values unless the API says otherwise.
pub const DEFAULT_ENERGY_UNIT: &str = "kWh";

// ============================================================================
// Resolution
// ============================================================================

/// Interval length of a consumption series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// 15-minute intervals.
    QuarterHour,
    /// 1-hour intervals.
    Hour,
    /// Calendar days.
    Day,
    /// Calendar months.
    Month,
}

impl Resolution {
    /// Fixed interval length. `None` for months.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::QuarterHour => Some(Duration::minutes(15)),
            Self::Hour => Some(Duration::hours(1)),
            Self::Day => Some(Duration::days(1)),
            Self::Month => None,
        }
    }

    /// Name the time-series endpoint expects.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::QuarterHour => "QUARTER_HOUR",
            Self::Hour => "HOUR",
            Self::Day => "DAY",
            Self::Month => "MONTH",
        }
    }

    /// Parses a wire name, including the alternative spellings seen in
    /// API responses for quarter-hour data.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "QUARTER_HOUR" | "PER_15_MIN" | "FIFTEEN_MINUTE" | "15MIN" | "PT15M" => {
                Some(Self::QuarterHour)
            }
            "HOUR" | "HOURLY" | "PT1H" => Some(Self::Hour),
            "DAY" | "DAILY" | "P1D" => Some(Self::Day),
            "MONTH" | "MONTHLY" | "P1M" => Some(Self::Month),
            _ => None,
        }
    }

    /// Short label used in statistic ids and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::QuarterHour => "15min",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Returns true if `ts` falls on an interval boundary for this resolution.
    ///
    /// Day and month boundaries depend on the market time zone and are not
    /// checked here.
    pub fn is_aligned(&self, ts: DateTime<Utc>) -> bool {
        if ts.second() != 0 || ts.nanosecond() != 0 {
            return false;
        }
        match self {
            Self::QuarterHour => ts.minute() % 15 == 0,
            Self::Hour => ts.minute() == 0,
            Self::Day | Self::Month => true,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Consumption Sample
// ============================================================================

/// One interval of metered consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSample {
    /// Metering point the sample belongs to.
    pub metering_point: String,
    /// Start of the interval.
    pub start: DateTime<Utc>,
    /// Interval length.
    pub resolution: Resolution,
    /// Energy consumed during the interval.
    pub energy: f64,
    /// Unit of `energy`.
    pub unit: String,
    /// Cost of the interval in the market currency, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Identity of a sample for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    /// Metering point.
    pub metering_point: String,
    /// Interval start.
    pub start: DateTime<Utc>,
    /// Interval length.
    pub resolution: Resolution,
}

impl ConsumptionSample {
    /// Creates a sample in kWh with no cost.
    pub fn new(
        metering_point: impl Into<String>,
        start: DateTime<Utc>,
        resolution: Resolution,
        energy: f64,
    ) -> Self {
        Self {
            metering_point: metering_point.into(),
            start,
            resolution,
            energy,
            unit: DEFAULT_ENERGY_UNIT.to_string(),
            cost: None,
        }
    }

    /// Sets the cost.
    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Deduplication key.
    pub fn key(&self) -> SampleKey {
        SampleKey {
            metering_point: self.metering_point.clone(),
            start: self.start,
            resolution: self.resolution,
        }
    }

    /// End of the interval, when the resolution has a fixed length.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.resolution.interval().map(|d| self.start + d)
    }

    /// Validates the sample.
    ///
    /// Energy must be finite and non-negative, cost finite, and the start
    /// aligned to the resolution.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.energy.is_finite() || self.energy < 0.0 {
            return Err(CoreError::InvalidData(format!(
                "energy at {} is {}",
                self.start, self.energy
            )));
        }
        if let Some(cost) = self.cost {
            if !cost.is_finite() {
                return Err(CoreError::InvalidData(format!(
                    "cost at {} is {cost}",
                    self.start
                )));
            }
        }
        if !self.resolution.is_aligned(self.start) {
            return Err(CoreError::InvalidData(format!(
                "{} is not aligned to {} resolution",
                self.start, self.resolution
            )));
        }
        Ok(())
    }
}

/// Sorts samples by key and drops duplicates. The last occurrence wins.
pub fn dedup_samples(samples: Vec<ConsumptionSample>) -> Vec<ConsumptionSample> {
    let mut by_key = std::collections::BTreeMap::new();
    for sample in samples {
        by_key.insert(sample.key(), sample);
    }
    by_key.into_values().collect()
}

// ============================================================================
// Date Range
// ============================================================================

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a range; `end` must be after `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if end <= start {
            return Err(CoreError::InvalidData(format!(
                "empty date range {start}..{end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The local calendar day `date` in `tz`, as UTC instants.
    ///
    /// DST transition days are 23 or 25 hours long.
    pub fn for_local_day(date: NaiveDate, tz: Tz) -> Result<Self, CoreError> {
        let next = date
            .succ_opt()
            .ok_or_else(|| CoreError::InvalidData(format!("no day after {date}")))?;
        Self::new(local_midnight(date, tz)?, local_midnight(next, tz)?)
    }

    /// Returns true if `ts` lies inside the range.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Length of the range.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, CoreError> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CoreError::InvalidData(format!("no midnight on {date}")))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CoreError::InvalidData(format!("midnight of {date} does not exist in {}", tz.name())))
}
