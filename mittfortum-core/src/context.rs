//! Integration context passed to every component.
//!
//! Replaces module-level registries: the secret store, statistics sink,
//! availability notifier and statistic ids travel together in one value.

use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{Locale, StatisticIds};
use crate::traits::{AvailabilityNotifier, NoopAvailability, SecretStore, StatisticsSink};

// ============================================================================
// Integration Context
// ============================================================================

/// Handles to host capabilities plus entity identifiers.
#[derive(Clone)]
pub struct IntegrationContext {
    /// Locale: market, currency, time zone and UI strings.
    pub locale: Locale,
    /// Token persistence.
    pub secrets: Arc<dyn SecretStore>,
    /// Statistics sink.
    pub statistics: Arc<dyn StatisticsSink>,
    /// Entity availability.
    pub availability: Arc<dyn AvailabilityNotifier>,
    /// Statistic id builder.
    pub statistic_ids: StatisticIds,
}

impl IntegrationContext {
    /// Creates a builder.
    pub fn builder() -> IntegrationContextBuilder {
        IntegrationContextBuilder::new()
    }
}

impl std::fmt::Debug for IntegrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationContext")
            .field("locale", &self.locale)
            .field("statistic_ids", &self.statistic_ids)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`IntegrationContext`].
#[derive(Default)]
pub struct IntegrationContextBuilder {
    locale: Locale,
    secrets: Option<Arc<dyn SecretStore>>,
    statistics: Option<Arc<dyn StatisticsSink>>,
    availability: Option<Arc<dyn AvailabilityNotifier>>,
    statistic_ids: Option<StatisticIds>,
}

impl IntegrationContextBuilder {
    /// Creates a builder with the default locale.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the locale.
    #[must_use]
    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Sets the secret store.
    #[must_use]
    pub fn secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Sets the statistics sink.
    #[must_use]
    pub fn statistics(mut self, statistics: Arc<dyn StatisticsSink>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Sets the availability notifier.
    #[must_use]
    pub fn availability(mut self, availability: Arc<dyn AvailabilityNotifier>) -> Self {
        self.availability = Some(availability);
        self
    }

    /// Sets the statistic id builder.
    #[must_use]
    pub fn statistic_ids(mut self, ids: StatisticIds) -> Self {
        self.statistic_ids = Some(ids);
        self
    }

    /// Builds the context. The secret store and statistics sink are required.
    pub fn build(self) -> Result<IntegrationContext, CoreError> {
        let secrets = self
            .secrets
            .ok_or_else(|| CoreError::InvalidConfig("secret store not configured".to_string()))?;
        let statistics = self.statistics.ok_or_else(|| {
            CoreError::InvalidConfig("statistics sink not configured".to_string())
        })?;

        Ok(IntegrationContext {
            locale: self.locale,
            secrets,
            statistics,
            availability: self
                .availability
                .unwrap_or_else(|| Arc::new(NoopAvailability)),
            statistic_ids: self.statistic_ids.unwrap_or_default(),
        })
    }
}
