//! Host capability traits.
//!
//! The auth client, API client and poller never talk to a host runtime
//! directly. They go through these traits, which an adapter per host
//! implements (the bundled CLI uses the keychain and a SQLite file).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::{DateRange, ImportBatch, ImportSummary, StatisticPoint, TokenSet};

/// Key/value secret storage for the token set.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Loads the stored token set, if any.
    async fn load_token(&self) -> Result<Option<TokenSet>, CoreError>;

    /// Replaces the stored token set.
    async fn save_token(&self, token: &TokenSet) -> Result<(), CoreError>;

    /// Removes the stored token set. Succeeds if nothing was stored.
    async fn clear_token(&self) -> Result<(), CoreError>;
}

/// Statistics import sink.
///
/// `import` must be atomic: either every series in the batch is written or
/// none is. Points are upserted by `(statistic_id, start)`, so importing the
/// same batch twice leaves the store unchanged.
#[async_trait]
pub trait StatisticsSink: Send + Sync {
    /// Latest point of `statistic_id` that starts strictly before `before`.
    async fn last_point_before(
        &self,
        statistic_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>, CoreError>;

    /// Upserts all series in the batch as one unit.
    async fn import(&self, batch: &ImportBatch) -> Result<ImportSummary, CoreError>;

    /// Points of `statistic_id`, optionally limited to `range`, ordered by start.
    async fn series(
        &self,
        statistic_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<StatisticPoint>, CoreError>;
}

/// Exposes entity availability to the host.
pub trait AvailabilityNotifier: Send + Sync {
    /// Marks an entity available or unavailable.
    fn set_available(&self, entity_id: &str, available: bool, reason: Option<&str>);

    /// Signals that the user must authorize again.
    fn reauth_required(&self, _reason: &str) {}
}

/// Notifier that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAvailability;

impl AvailabilityNotifier for NoopAvailability {
    fn set_available(&self, _entity_id: &str, _available: bool, _reason: Option<&str>) {}
}
