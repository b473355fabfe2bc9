//! Test doubles shared by the unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mittfortum_core::{
    CoreError, DateRange, ImportBatch, ImportSummary, SecretStore, StatisticPoint, StatisticsSink,
    TokenSet,
};

/// Secret store holding at most one token in memory.
#[derive(Debug, Default)]
pub(crate) struct MemorySecrets {
    token: Mutex<Option<TokenSet>>,
}

impl MemorySecrets {
    pub(crate) fn with_token(token: TokenSet) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    pub(crate) fn get(&self) -> Option<TokenSet> {
        self.token.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for MemorySecrets {
    async fn load_token(&self) -> Result<Option<TokenSet>, CoreError> {
        Ok(self.get())
    }

    async fn save_token(&self, token: &TokenSet) -> Result<(), CoreError> {
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), CoreError> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

/// Statistics sink that stores nothing.
#[derive(Debug, Default)]
pub(crate) struct NullStatistics;

#[async_trait]
impl StatisticsSink for NullStatistics {
    async fn last_point_before(
        &self,
        _statistic_id: &str,
        _before: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>, CoreError> {
        Ok(None)
    }

    async fn import(&self, _batch: &ImportBatch) -> Result<ImportSummary, CoreError> {
        Ok(ImportSummary::default())
    }

    async fn series(
        &self,
        _statistic_id: &str,
        _range: Option<DateRange>,
    ) -> Result<Vec<StatisticPoint>, CoreError> {
        Ok(Vec::new())
    }
}
