// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `MittFortum` Core
//!
//! Core types, models, and host traits shared by all `MittFortum` crates.
//!
//! ## Key Types
//!
//! ### Auth & Accounts
//! - [`TokenSet`] - OAuth access/refresh token pair with expiry
//! - [`MeteringPoint`] - Provider-side meter identifier
//! - [`Locale`] / [`Market`] - Endpoints, currency and time zone selection
//!
//! ### Consumption
//! - [`ConsumptionSample`] - One metered interval
//! - [`Resolution`] - Quarter-hour, hour, day or month
//! - [`DateRange`] - Half-open UTC range
//!
//! ### Polling & Statistics
//! - [`PollState`] / [`PollPhase`] - Retry-until-available bookkeeping
//! - [`StatisticSeries`] / [`ImportBatch`] - What the statistics sink receives
//! - [`StatisticIds`] - Entity ids for hourly and 15-minute series
//!
//! ### Host Capabilities
//! - [`SecretStore`], [`StatisticsSink`], [`AvailabilityNotifier`]
//! - [`IntegrationContext`] - Bundles the above for every component

pub mod context;
pub mod error;
pub mod i18n;
pub mod models;
pub mod traits;

pub use context::{IntegrationContext, IntegrationContextBuilder};
pub use error::CoreError;

pub use models::{
    // Auth & accounts
    EXPIRY_SKEW_SECS,
    Locale,
    Market,
    MeteringPoint,
    TokenSet,
    // Consumption
    ConsumptionSample,
    DEFAULT_ENERGY_UNIT,
    DateRange,
    Resolution,
    SampleKey,
    dedup_samples,
    // Polling
    PollPhase,
    PollState,
    // Statistics
    DEFAULT_ID_PREFIX,
    ImportBatch,
    ImportSummary,
    STATISTICS_SOURCE,
    StatisticIds,
    StatisticKind,
    StatisticMetadata,
    StatisticPoint,
    StatisticSeries,
};

pub use traits::{AvailabilityNotifier, NoopAvailability, SecretStore, StatisticsSink};
