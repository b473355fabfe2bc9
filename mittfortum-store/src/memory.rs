//! In-memory host capabilities for tests and `--dry-run`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mittfortum_core::{
    CoreError, DateRange, ImportBatch, ImportSummary, SecretStore, StatisticMetadata,
    StatisticPoint, StatisticsSink, TokenSet,
};
use tokio::sync::RwLock;

/// Token store that forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<TokenSet>>,
}

impl MemoryTokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `token`.
    pub fn with_token(token: TokenSet) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

#[async_trait]
impl SecretStore for MemoryTokenStore {
    async fn load_token(&self) -> Result<Option<TokenSet>, CoreError> {
        Ok(self.token.read().await.clone())
    }

    async fn save_token(&self, token: &TokenSet) -> Result<(), CoreError> {
        *self.token.write().await = Some(token.clone());
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), CoreError> {
        *self.token.write().await = None;
        Ok(())
    }
}

#[derive(Debug)]
struct StoredSeries {
    metadata: StatisticMetadata,
    points: BTreeMap<DateTime<Utc>, StatisticPoint>,
}

/// Statistics sink backed by ordered maps. Same upsert and re-chaining
/// rules as the SQLite sink.
#[derive(Debug, Default)]
pub struct MemoryStatistics {
    series: RwLock<HashMap<String, StoredSeries>>,
    imports: RwLock<Vec<ImportSummary>>,
}

impl MemoryStatistics {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata of a stored series.
    pub async fn metadata(&self, statistic_id: &str) -> Option<StatisticMetadata> {
        self.series
            .read()
            .await
            .get(statistic_id)
            .map(|s| s.metadata.clone())
    }

    /// Ids of every stored series, sorted.
    pub async fn statistic_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.series.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Summaries of every successful import, oldest first.
    pub async fn imports(&self) -> Vec<ImportSummary> {
        self.imports.read().await.clone()
    }
}

#[async_trait]
impl StatisticsSink for MemoryStatistics {
    async fn last_point_before(
        &self,
        statistic_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>, CoreError> {
        Ok(self.series.read().await.get(statistic_id).and_then(|s| {
            s.points
                .range(..before)
                .next_back()
                .map(|(_, point)| *point)
        }))
    }

    async fn import(&self, batch: &ImportBatch) -> Result<ImportSummary, CoreError> {
        batch.validate()?;

        let mut all = self.series.write().await;
        let mut summary = ImportSummary::default();
        for series in &batch.series {
            let stored = all
                .entry(series.metadata.statistic_id.clone())
                .or_insert_with(|| StoredSeries {
                    metadata: series.metadata.clone(),
                    points: BTreeMap::new(),
                });
            stored.metadata = series.metadata.clone();
            for point in &series.points {
                stored.points.insert(point.start, *point);
            }
            if let Some(last) = series.points.last() {
                let mut running = last.sum;
                for (_, later) in stored
                    .points
                    .range_mut((std::ops::Bound::Excluded(last.start), std::ops::Bound::Unbounded))
                {
                    running += later.state;
                    later.sum = running;
                }
            }
            summary.series += 1;
            summary.points += series.points.len();
        }

        if !batch.is_empty() {
            self.imports.write().await.push(summary);
        }
        Ok(summary)
    }

    async fn series(
        &self,
        statistic_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<StatisticPoint>, CoreError> {
        Ok(self
            .series
            .read()
            .await
            .get(statistic_id)
            .map(|s| {
                s.points
                    .values()
                    .filter(|p| range.is_none_or(|r| r.contains(p.start)))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
