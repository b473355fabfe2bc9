//! SQLite statistics sink.
//!
//! Two tables: `statistics_meta` (one row per series) and `statistics`
//! (one row per interval, keyed by `(statistic_id, start)`). Imports are
//! upserts inside a single transaction, so a batch lands completely or not
//! at all and re-importing the same batch is a no-op.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mittfortum_core::{
    CoreError, DateRange, ImportBatch, ImportSummary, Resolution, StatisticKind,
    StatisticMetadata, StatisticPoint, StatisticSeries, StatisticsSink,
};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS statistics_meta (
    statistic_id TEXT PRIMARY KEY NOT NULL,
    name         TEXT NOT NULL,
    unit         TEXT NOT NULL,
    source       TEXT NOT NULL,
    resolution   TEXT NOT NULL,
    kind         TEXT NOT NULL,
    has_sum      INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS statistics (
    statistic_id TEXT NOT NULL REFERENCES statistics_meta(statistic_id),
    start        INTEGER NOT NULL,
    state        REAL NOT NULL,
    sum          REAL NOT NULL,
    PRIMARY KEY (statistic_id, start)
);
";

/// Per-series overview for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    /// Series description.
    pub metadata: StatisticMetadata,
    /// Stored points.
    pub points: usize,
    /// First interval start.
    pub first: Option<DateTime<Utc>>,
    /// Last interval start.
    pub last: Option<DateTime<Utc>>,
    /// Running total at the last point.
    pub last_sum: Option<f64>,
}

/// Statistics stored in a SQLite database.
#[derive(Clone)]
pub struct SqliteStatistics {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatistics")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStatistics {
    /// Opens (or creates) the database at `path`.
    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        info!("Opened statistics database");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// In-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file, if not in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("statistics connection poisoned".into()))?;
            f(&mut guard)
        })
        .await?
    }

    /// Overview of every stored series.
    pub async fn summaries(&self) -> Result<Vec<SeriesSummary>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.statistic_id, m.name, m.unit, m.source, m.resolution, m.kind, m.has_sum,
                        COUNT(s.start), MIN(s.start), MAX(s.start)
                 FROM statistics_meta m
                 LEFT JOIN statistics s ON s.statistic_id = m.statistic_id
                 GROUP BY m.statistic_id
                 ORDER BY m.statistic_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    MetaRow {
                        statistic_id: row.get(0)?,
                        name: row.get(1)?,
                        unit: row.get(2)?,
                        source: row.get(3)?,
                        resolution: row.get(4)?,
                        kind: row.get(5)?,
                        has_sum: row.get(6)?,
                    },
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                ))
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                let (meta, count, first, last) = row?;
                let metadata = meta.into_metadata()?;
                let last_sum = match last {
                    Some(start) => conn
                        .query_row(
                            "SELECT sum FROM statistics WHERE statistic_id = ?1 AND start = ?2",
                            params![metadata.statistic_id, start],
                            |row| row.get(0),
                        )
                        .optional()?,
                    None => None,
                };
                summaries.push(SeriesSummary {
                    metadata,
                    points: usize::try_from(count).unwrap_or_default(),
                    first: first.map(from_epoch).transpose()?,
                    last: last.map(from_epoch).transpose()?,
                    last_sum,
                });
            }
            Ok(summaries)
        })
        .await
    }

    /// Metadata and points of one series.
    pub async fn load_series(
        &self,
        statistic_id: &str,
        range: Option<DateRange>,
    ) -> Result<Option<StatisticSeries>, StoreError> {
        let id = statistic_id.to_string();
        self.with_conn(move |conn| {
            let meta = conn
                .query_row(
                    "SELECT statistic_id, name, unit, source, resolution, kind, has_sum
                     FROM statistics_meta WHERE statistic_id = ?1",
                    params![id],
                    |row| {
                        Ok(MetaRow {
                            statistic_id: row.get(0)?,
                            name: row.get(1)?,
                            unit: row.get(2)?,
                            source: row.get(3)?,
                            resolution: row.get(4)?,
                            kind: row.get(5)?,
                            has_sum: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            let Some(meta) = meta else {
                return Ok(None);
            };
            let points = select_points(conn, &id, range)?;
            Ok(Some(StatisticSeries {
                metadata: meta.into_metadata()?,
                points,
            }))
        })
        .await
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

struct MetaRow {
    statistic_id: String,
    name: String,
    unit: String,
    source: String,
    resolution: String,
    kind: String,
    has_sum: bool,
}

impl MetaRow {
    fn into_metadata(self) -> Result<StatisticMetadata, StoreError> {
        let resolution = Resolution::from_wire_name(&self.resolution).ok_or_else(|| {
            StoreError::Invalid(format!(
                "{}: unknown resolution {}",
                self.statistic_id, self.resolution
            ))
        })?;
        let kind = match self.kind.as_str() {
            "energy" => StatisticKind::Energy,
            "cost" => StatisticKind::Cost,
            other => {
                return Err(StoreError::Invalid(format!(
                    "{}: unknown kind {other}",
                    self.statistic_id
                )));
            }
        };
        Ok(StatisticMetadata {
            statistic_id: self.statistic_id,
            name: self.name,
            unit: self.unit,
            source: self.source,
            resolution,
            kind,
            has_sum: self.has_sum,
        })
    }
}

fn kind_name(kind: StatisticKind) -> &'static str {
    match kind {
        StatisticKind::Energy => "energy",
        StatisticKind::Cost => "cost",
    }
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Invalid(format!("timestamp {secs} out of range")))
}

fn select_points(
    conn: &Connection,
    statistic_id: &str,
    range: Option<DateRange>,
) -> Result<Vec<StatisticPoint>, StoreError> {
    let (from, to) = range.map_or((i64::MIN, i64::MAX), |r| {
        (r.start.timestamp(), r.end.timestamp())
    });
    let mut stmt = conn.prepare_cached(
        "SELECT start, state, sum FROM statistics
         WHERE statistic_id = ?1 AND start >= ?2 AND start < ?3
         ORDER BY start",
    )?;
    let rows = stmt.query_map(params![statistic_id, from, to], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;

    let mut points = Vec::new();
    for row in rows {
        let (start, state, sum) = row?;
        points.push(StatisticPoint {
            start: from_epoch(start)?,
            state,
            sum,
        });
    }
    Ok(points)
}

/// Writes one series and re-chains the sums of any later points.
fn upsert_series(tx: &Transaction<'_>, series: &StatisticSeries) -> Result<usize, StoreError> {
    let meta = &series.metadata;
    tx.execute(
        "INSERT INTO statistics_meta (statistic_id, name, unit, source, resolution, kind, has_sum)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(statistic_id) DO UPDATE SET
            name = excluded.name, unit = excluded.unit, source = excluded.source,
            resolution = excluded.resolution, kind = excluded.kind, has_sum = excluded.has_sum",
        params![
            meta.statistic_id,
            meta.name,
            meta.unit,
            meta.source,
            meta.resolution.wire_name(),
            kind_name(meta.kind),
            meta.has_sum
        ],
    )?;

    let mut upsert = tx.prepare_cached(
        "INSERT INTO statistics (statistic_id, start, state, sum) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(statistic_id, start) DO UPDATE SET state = excluded.state, sum = excluded.sum",
    )?;
    for point in &series.points {
        upsert.execute(params![
            meta.statistic_id,
            point.start.timestamp(),
            point.state,
            point.sum
        ])?;
    }

    let Some(last) = series.points.last() else {
        return Ok(0);
    };

    // Points after the batch keep their states but their sums now start from
    // the batch's last sum.
    let later: Vec<(i64, f64)> = {
        let mut stmt = tx.prepare_cached(
            "SELECT start, state FROM statistics WHERE statistic_id = ?1 AND start > ?2 ORDER BY start",
        )?;
        let rows = stmt.query_map(params![meta.statistic_id, last.start.timestamp()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        let later = rows.collect::<Result<Vec<_>, _>>()?;
        later
    };
    if !later.is_empty() {
        debug!(statistic_id = %meta.statistic_id, count = later.len(), "Re-chaining later sums");
        let mut update = tx.prepare_cached(
            "UPDATE statistics SET sum = ?3 WHERE statistic_id = ?1 AND start = ?2",
        )?;
        let mut running = last.sum;
        for (start, state) in later {
            running += state;
            update.execute(params![meta.statistic_id, start, running])?;
        }
    }

    Ok(series.points.len())
}

// ============================================================================
// Sink
// ============================================================================

#[async_trait]
impl StatisticsSink for SqliteStatistics {
    async fn last_point_before(
        &self,
        statistic_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>, CoreError> {
        let id = statistic_id.to_string();
        let row = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT start, state, sum FROM statistics
                         WHERE statistic_id = ?1 AND start < ?2
                         ORDER BY start DESC LIMIT 1",
                        params![id, before.timestamp()],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, f64>(1)?,
                                row.get::<_, f64>(2)?,
                            ))
                        },
                    )
                    .optional()?)
            })
            .await?;

        Ok(match row {
            Some((start, state, sum)) => Some(StatisticPoint {
                start: from_epoch(start)?,
                state,
                sum,
            }),
            None => None,
        })
    }

    #[instrument(skip(self, batch), fields(series = batch.series.len(), points = batch.total_points()))]
    async fn import(&self, batch: &ImportBatch) -> Result<ImportSummary, CoreError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(ImportSummary::default());
        }

        let batch = batch.clone();
        let summary = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut summary = ImportSummary::default();
                for series in &batch.series {
                    summary.points += upsert_series(&tx, series)?;
                    summary.series += 1;
                }
                tx.commit()?;
                Ok(summary)
            })
            .await?;

        info!(series = summary.series, points = summary.points, "Imported statistics");
        Ok(summary)
    }

    async fn series(
        &self,
        statistic_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<StatisticPoint>, CoreError> {
        let id = statistic_id.to_string();
        Ok(self
            .with_conn(move |conn| select_points(conn, &id, range))
            .await?)
    }
}

// ============================================================================
// Tests
// ============================================================================
