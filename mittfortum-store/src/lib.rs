// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `MittFortum` Store
//!
//! Host-side persistence for the `MittFortum` poller.
//!
//! This crate provides:
//!
//! - **Config**: TOML configuration with per-field defaults
//! - **Token storage**: [`KeychainTokenStore`] with a [`FileTokenStore`] fallback
//! - **Statistics**: [`SqliteStatistics`], an atomic upserting sink
//! - **Persistence**: owner-only atomic JSON writes
//!
//! ## Usage
//!
//! ```ignore
//! use mittfortum_store::{Config, SqliteStatistics};
//!
//! let config = Config::load()?;
//! let statistics = SqliteStatistics::open(&config.database_path())?;
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod persistence;
pub mod statistics_store;
pub mod token_store;

pub use config::{
    AccountConfig, AuthConfig, Config, HttpConfig, MAX_INTERVAL_MINUTES, PollConfig,
    StatisticsConfig, TokenStorage, minutes_period,
};
pub use error::StoreError;
pub use memory::{MemoryStatistics, MemoryTokenStore};
pub use persistence::{
    default_config_dir, default_config_path, default_data_dir, default_database_path,
    default_token_path, load_json, load_json_opt, save_json,
};
pub use statistics_store::{SeriesSummary, SqliteStatistics};
pub use token_store::{FileTokenStore, KeychainTokenStore};
