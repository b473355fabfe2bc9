// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `MittFortum` Sync
//!
//! Polls a [`mittfortum_api::ConsumptionSource`] and imports what it
//! returns into the host's statistics sink.
//!
//! - [`Poller`] - the fetch/import state machine, one cycle per tick
//! - [`StatisticsImporter`] - samples to hourly and 15-minute series
//! - [`BackfillSchedule`] - target day, publication gate, retry cap
//! - [`Scheduler`] - periodic ticks with cancellation
//!
//! ## Example
//!
//! ```ignore
//! let poller = Poller::new(source, ctx.clone(), PollerSettings::for_context(&ctx));
//! let scheduler = Scheduler::new();
//! scheduler
//!     .run_poller(Arc::new(Mutex::new(poller)), Duration::from_secs(1800), |o| {
//!         println!("{:?}", o.phase);
//!     })
//!     .await;
//! ```

pub mod error;
pub mod importer;
pub mod poller;
pub mod runner;
pub mod schedule;

pub use error::SyncError;
pub use importer::{StatisticsImporter, aggregate_hourly};
pub use poller::{Poller, PollerSettings, PollerStatus, TickOutcome};
pub use runner::Scheduler;
pub use schedule::{BackfillSchedule, RETRY_SLACK_SECS};
