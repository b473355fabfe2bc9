//! Turns consumption samples into statistics series.
//!
//! Each resolution maps to its own series; hourly samples never land in
//! the 15-minute series and vice versa. Cumulative sums continue from the
//! last point the sink holds strictly before the first new interval.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use mittfortum_core::{
    ConsumptionSample, CoreError, DEFAULT_ENERGY_UNIT, ImportBatch, Locale, Resolution,
    STATISTICS_SOURCE, StatisticIds, StatisticKind, StatisticMetadata, StatisticPoint,
    StatisticSeries, StatisticsSink, dedup_samples, i18n,
};
use tracing::{debug, instrument, warn};

/// Quarters that make up one hour.
const QUARTERS_PER_HOUR: usize = 4;

/// Builds import batches for one locale.
#[derive(Debug, Clone)]
pub struct StatisticsImporter {
    locale: Locale,
}

impl StatisticsImporter {
    /// Names and currency follow `locale`.
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    fn metadata(
        &self,
        ids: &StatisticIds,
        kind: StatisticKind,
        resolution: Resolution,
        unit: &str,
    ) -> StatisticMetadata {
        let mut name = i18n::translate(self.locale, kind.name_key());
        if resolution != Resolution::Hour {
            name = format!("{name} ({})", resolution.label());
        }
        StatisticMetadata {
            statistic_id: ids.id(kind, resolution),
            name,
            unit: unit.to_string(),
            source: STATISTICS_SOURCE.to_string(),
            resolution,
            kind,
            has_sum: true,
        }
    }

    /// Adds the energy and cost series for `samples` to `batch`.
    ///
    /// Only hourly and quarter-hour samples are imported; other
    /// resolutions are ignored.
    #[instrument(skip_all, fields(samples = samples.len()))]
    pub async fn append(
        &self,
        batch: &mut ImportBatch,
        sink: &dyn StatisticsSink,
        ids: &StatisticIds,
        samples: Vec<ConsumptionSample>,
    ) -> Result<(), CoreError> {
        let samples = dedup_samples(samples);
        for sample in &samples {
            sample.validate()?;
        }

        for resolution in [Resolution::Hour, Resolution::QuarterHour] {
            let of_resolution: Vec<&ConsumptionSample> = samples
                .iter()
                .filter(|s| s.resolution == resolution)
                .collect();
            if of_resolution.is_empty() {
                continue;
            }

            let unit = of_resolution
                .first()
                .map_or(DEFAULT_ENERGY_UNIT, |s| s.unit.as_str());
            let energy: Vec<(DateTime<Utc>, f64)> =
                of_resolution.iter().map(|s| (s.start, s.energy)).collect();
            let meta = self.metadata(ids, StatisticKind::Energy, resolution, unit);
            batch.push(chain(sink, meta, &energy).await?);

            let cost: Vec<(DateTime<Utc>, f64)> = of_resolution
                .iter()
                .filter_map(|s| s.cost.map(|c| (s.start, c)))
                .collect();
            if !cost.is_empty() {
                let meta = self.metadata(
                    ids,
                    StatisticKind::Cost,
                    resolution,
                    self.locale.currency(),
                );
                batch.push(chain(sink, meta, &cost).await?);
            }
        }

        let ignored = samples
            .iter()
            .filter(|s| !matches!(s.resolution, Resolution::Hour | Resolution::QuarterHour))
            .count();
        if ignored > 0 {
            debug!(ignored, "Skipped samples at unsupported resolutions");
        }
        Ok(())
    }
}

/// Builds a series whose sums continue from the sink's earlier data.
async fn chain(
    sink: &dyn StatisticsSink,
    metadata: StatisticMetadata,
    values: &[(DateTime<Utc>, f64)],
) -> Result<StatisticSeries, CoreError> {
    let mut series = StatisticSeries::new(metadata);
    let Some(&(first, _)) = values.first() else {
        return Ok(series);
    };

    let mut sum = sink
        .last_point_before(&series.metadata.statistic_id, first)
        .await?
        .map_or(0.0, |p| p.sum);
    debug!(statistic_id = %series.metadata.statistic_id, base = sum, "Continuing sum");

    for &(start, state) in values {
        sum += state;
        series.points.push(StatisticPoint { start, state, sum });
    }
    Ok(series)
}

/// Sums complete hours of quarter-hour samples into hourly samples.
///
/// An hour with anything other than exactly four quarters is skipped with
/// a warning. Cost is carried only when all four quarters have one.
pub fn aggregate_hourly(quarters: &[ConsumptionSample]) -> Vec<ConsumptionSample> {
    let mut hours: BTreeMap<(String, DateTime<Utc>), Vec<&ConsumptionSample>> = BTreeMap::new();
    for sample in quarters
        .iter()
        .filter(|s| s.resolution == Resolution::QuarterHour)
    {
        let Some(hour) = sample
            .start
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
        else {
            continue;
        };
        hours
            .entry((sample.metering_point.clone(), hour))
            .or_default()
            .push(sample);
    }

    let mut hourly = Vec::with_capacity(hours.len());
    for ((metering_point, hour), parts) in hours {
        let mut starts: Vec<DateTime<Utc>> = parts.iter().map(|s| s.start).collect();
        starts.sort();
        starts.dedup();
        if starts.len() != QUARTERS_PER_HOUR {
            warn!(
                metering_point = %metering_point,
                hour = %hour,
                quarters = starts.len(),
                "Skipping incomplete hour"
            );
            continue;
        }

        let energy = parts.iter().map(|s| s.energy).sum();
        let mut sample = ConsumptionSample::new(&metering_point, hour, Resolution::Hour, energy)
            .with_unit(parts[0].unit.clone());
        if parts.iter().all(|s| s.cost.is_some()) {
            sample = sample.with_cost(parts.iter().filter_map(|s| s.cost).sum());
        }
        hourly.push(sample);
    }
    hourly
}

// ============================================================================
// Tests
// ============================================================================
