//! Configuration management.
//!
//! The file is TOML; every field has a default so an empty or missing
//! file yields a working configuration for the Finnish market.
//!
//! ```toml
//! [account]
//! locale = "SV"
//! metering_points = ["643007"]
//!
//! [poll]
//! interval_minutes = 30
//! respect_publication_time = true
//!
//! [auth]
//! token_storage = "file"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use mittfortum_core::{DEFAULT_ID_PREFIX, Locale, StatisticIds};
use mittfortum_fetch::{FetchSettings, HttpSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{default_config_path, default_database_path, default_token_path};

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which account and meters to poll.
    pub account: AccountConfig,
    /// Poll cadence and backfill retries.
    pub poll: PollConfig,
    /// HTTP timeouts.
    pub http: HttpConfig,
    /// OAuth client and endpoint overrides.
    pub auth: AuthConfig,
    /// Statistics database and ids.
    pub statistics: StatisticsConfig,
}

/// `[account]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Market / language.
    pub locale: Locale,
    /// Metering points to poll. Empty means every point in the session.
    pub metering_points: Vec<String>,
}

/// Longest poll or retry period, in minutes.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Whole minutes as a period, clamped to `1..=MAX_INTERVAL_MINUTES`.
pub fn minutes_period(minutes: u64) -> Duration {
    Duration::from_secs(minutes.clamp(1, MAX_INTERVAL_MINUTES) * 60)
}

/// `[poll]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Minutes between regular ticks.
    pub interval_minutes: u64,
    /// Minutes between backfill retries while data is not published.
    pub retry_interval_minutes: u64,
    /// Local hour after which yesterday's data is normally published.
    pub publication_hour: u32,
    /// Skip backfill fetches before `publication_hour`.
    pub respect_publication_time: bool,
    /// Give up on a date after this many not-ready responses.
    pub max_retries: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            retry_interval_minutes: 30,
            publication_hour: 15,
            respect_publication_time: false,
            max_retries: None,
        }
    }
}

impl PollConfig {
    /// Tick period.
    pub fn interval(&self) -> Duration {
        minutes_period(self.interval_minutes)
    }

    /// Backfill retry period.
    pub fn retry_interval(&self) -> Duration {
        minutes_period(self.retry_interval_minutes)
    }
}

/// `[http]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout.
    pub timeout_secs: u64,
    /// TCP/TLS connect timeout.
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

/// Where the token set is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// System keychain, falling back to the token file if unavailable.
    #[default]
    Keychain,
    /// Owner-only JSON file.
    File,
}

/// `[auth]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client id override.
    pub client_id: Option<String>,
    /// OAuth scope override.
    pub scope: Option<String>,
    /// SSO base URL override.
    pub sso_base_url: Option<String>,
    /// Market site base URL override.
    pub api_base_url: Option<String>,
    /// Token backend.
    pub token_storage: TokenStorage,
    /// Token file path override.
    pub token_path: Option<PathBuf>,
}

/// `[statistics]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// SQLite database path override.
    pub database_path: Option<PathBuf>,
    /// Prefix of statistic ids.
    pub id_prefix: String,
    /// Wire name of the quarter-hour resolution.
    pub quarter_hour_wire_name: Option<String>,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            quarter_hour_wire_name: None,
        }
    }
}

impl Config {
    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        default_config_path()
    }

    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, StoreError> {
        Self::load_from(&Self::default_path())
    }

    /// Loads configuration from a specific path. A missing file gives defaults.
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        info!(path = %path.display(), locale = %config.account.locale, "Loaded configuration");
        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Rejects values the poller cannot work with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.poll.interval_minutes == 0 {
            return Err(StoreError::Config("poll.interval_minutes must be > 0".into()));
        }
        if self.poll.retry_interval_minutes == 0 {
            return Err(StoreError::Config(
                "poll.retry_interval_minutes must be > 0".into(),
            ));
        }
        if self.poll.publication_hour > 23 {
            return Err(StoreError::Config(format!(
                "poll.publication_hour {} is not an hour of the day",
                self.poll.publication_hour
            )));
        }
        if self.http.timeout_secs == 0 || self.http.connect_timeout_secs == 0 {
            return Err(StoreError::Config("http timeouts must be > 0".into()));
        }
        if self.statistics.id_prefix.trim().is_empty() || self.statistics.id_prefix.contains(':') {
            return Err(StoreError::Config(format!(
                "statistics.id_prefix {:?} must be non-empty and contain no ':'",
                self.statistics.id_prefix
            )));
        }
        for url in [&self.auth.sso_base_url, &self.auth.api_base_url]
            .into_iter()
            .flatten()
        {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(StoreError::Config(format!("{url} is not an http(s) URL")));
            }
        }
        Ok(())
    }

    /// HTTP settings for the fetch context. Overridden base URLs lift the
    /// domain allowlist.
    pub fn fetch_settings(&self) -> FetchSettings {
        let settings = FetchSettings {
            http: HttpSettings {
                timeout: Duration::from_secs(self.http.timeout_secs),
                connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            },
            ..FetchSettings::default()
        };
        if self.auth.sso_base_url.is_some() || self.auth.api_base_url.is_some() {
            settings.unrestricted()
        } else {
            settings
        }
    }

    /// Statistic ids under the configured prefix.
    pub fn statistic_ids(&self) -> StatisticIds {
        StatisticIds::new(self.statistics.id_prefix.trim())
    }

    /// Effective database path.
    pub fn database_path(&self) -> PathBuf {
        self.statistics
            .database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    /// Effective token file path.
    pub fn token_path(&self) -> PathBuf {
        self.auth.token_path.clone().unwrap_or_else(default_token_path)
    }
}

// ============================================================================
// Tests
// ============================================================================
