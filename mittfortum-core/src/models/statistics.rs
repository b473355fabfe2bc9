//! Statistics series handed to the host sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::consumption::Resolution;
use crate::error::CoreError;

/// Source tag attached to every series.
pub const STATISTICS_SOURCE: &str = "mittfortum";

/// Default prefix of statistic ids.
pub const DEFAULT_ID_PREFIX: &str = "mittfortum";

// ============================================================================
// Statistic Kind & Ids
// ============================================================================

/// What a series measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticKind {
    /// Energy consumption.
    Energy,
    /// Monetary cost.
    Cost,
}

impl StatisticKind {
    /// Translation key for the series name.
    pub fn name_key(&self) -> &'static str {
        match self {
            Self::Energy => "statistic.energy_consumption",
            Self::Cost => "statistic.energy_cost",
        }
    }
}

/// Builds statistic ids such as `mittfortum:energy_consumption_15min`.
///
/// Hourly and quarter-hour series always get distinct ids so the two
/// resolutions never share an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticIds {
    prefix: String,
    metering_point: Option<String>,
}

impl StatisticIds {
    /// Creates ids under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            metering_point: None,
        }
    }

    /// Returns ids suffixed with a metering point, for multi-meter accounts.
    #[must_use]
    pub fn scoped(&self, metering_point: &str) -> Self {
        Self {
            prefix: self.prefix.clone(),
            metering_point: Some(metering_point.to_string()),
        }
    }

    /// The id prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Id for a kind at a resolution.
    pub fn id(&self, kind: StatisticKind, resolution: Resolution) -> String {
        let base = match kind {
            StatisticKind::Energy => "energy_consumption",
            StatisticKind::Cost => "energy_cost",
        };
        let mut id = format!("{}:{base}", self.prefix);
        if resolution != Resolution::Hour {
            id.push('_');
            id.push_str(resolution.label());
        }
        if let Some(mp) = &self.metering_point {
            id.push('_');
            id.push_str(mp);
        }
        id
    }

    /// All ids the importer writes.
    pub fn all(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(4);
        for kind in [StatisticKind::Energy, StatisticKind::Cost] {
            for resolution in [Resolution::Hour, Resolution::QuarterHour] {
                ids.push(self.id(kind, resolution));
            }
        }
        ids
    }
}

impl Default for StatisticIds {
    fn default() -> Self {
        Self::new(DEFAULT_ID_PREFIX)
    }
}

// ============================================================================
// Series
// ============================================================================

/// Describes a statistics series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticMetadata {
    /// Unique id, e.g. `mittfortum:energy_consumption`.
    pub statistic_id: String,
    /// Human readable name.
    pub name: String,
    /// Unit of measurement (`kWh`, `EUR`, ...).
    pub unit: String,
    /// Producer tag.
    pub source: String,
    /// Interval length of each point.
    pub resolution: Resolution,
    /// What the series measures.
    pub kind: StatisticKind,
    /// Whether points carry a cumulative sum.
    pub has_sum: bool,
}

/// One interval in a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticPoint {
    /// Interval start.
    pub start: DateTime<Utc>,
    /// Value within the interval.
    pub state: f64,
    /// Running total up to and including this interval.
    pub sum: f64,
}

/// Metadata plus ordered points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticSeries {
    /// Series description.
    pub metadata: StatisticMetadata,
    /// Points ordered by `start`.
    pub points: Vec<StatisticPoint>,
}

impl StatisticSeries {
    /// Creates an empty series.
    pub fn new(metadata: StatisticMetadata) -> Self {
        Self {
            metadata,
            points: Vec::new(),
        }
    }

    /// Returns true if the series has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Start of the first point.
    pub fn first_start(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.start)
    }

    /// Sum of the last point.
    pub fn last_sum(&self) -> Option<f64> {
        self.points.last().map(|p| p.sum)
    }

    /// Points must be strictly ordered and finite.
    pub fn validate(&self) -> Result<(), CoreError> {
        for pair in self.points.windows(2) {
            if pair[1].start <= pair[0].start {
                return Err(CoreError::InvalidData(format!(
                    "{}: points out of order at {}",
                    self.metadata.statistic_id, pair[1].start
                )));
            }
        }
        if let Some(bad) = self
            .points
            .iter()
            .find(|p| !p.state.is_finite() || !p.sum.is_finite())
        {
            return Err(CoreError::InvalidData(format!(
                "{}: non-finite value at {}",
                self.metadata.statistic_id, bad.start
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Import Batch
// ============================================================================

/// Everything one poll cycle writes. Applied by the sink as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    /// Series to upsert.
    pub series: Vec<StatisticSeries>,
}

impl ImportBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a series; empty series are dropped.
    pub fn push(&mut self, series: StatisticSeries) {
        if !series.is_empty() {
            self.series.push(series);
        }
    }

    /// Returns true if nothing would be written.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of points across all series.
    pub fn total_points(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }

    /// Finds a series by id.
    pub fn get(&self, statistic_id: &str) -> Option<&StatisticSeries> {
        self.series
            .iter()
            .find(|s| s.metadata.statistic_id == statistic_id)
    }

    /// Validates every series and rejects duplicate ids.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = std::collections::HashSet::new();
        for series in &self.series {
            if !seen.insert(series.metadata.statistic_id.as_str()) {
                return Err(CoreError::InvalidData(format!(
                    "duplicate series {} in batch",
                    series.metadata.statistic_id
                )));
            }
            series.validate()?;
        }
        Ok(())
    }
}

/// What a sink reports after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Series touched.
    pub series: usize,
    /// Points written (inserted or updated).
    pub points: usize,
}
