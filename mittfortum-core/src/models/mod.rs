//! Domain models for `MittFortum`.
//!
//! - [`token`] - OAuth token set
//! - [`locale`] - Locales and markets
//! - [`metering`] - Metering points
//! - [`consumption`] - Samples, resolutions, date ranges
//! - [`poll`] - Poller phase and retry state
//! - [`statistics`] - Series handed to the statistics sink

mod consumption;
mod locale;
mod metering;
mod poll;
mod statistics;
mod token;

pub use consumption::{
    ConsumptionSample, DEFAULT_ENERGY_UNIT, DateRange, Resolution, SampleKey, dedup_samples,
};
pub use locale::{Locale, Market};
pub use metering::MeteringPoint;
pub use poll::{PollPhase, PollState};
pub use statistics::{
    DEFAULT_ID_PREFIX, ImportBatch, ImportSummary, STATISTICS_SOURCE, StatisticIds,
    StatisticKind, StatisticMetadata, StatisticPoint, StatisticSeries,
};
pub use token::{EXPIRY_SKEW_SECS, TokenSet};

#[cfg(test)]
mod serde_tests;
