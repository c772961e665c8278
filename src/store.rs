//! SQLite persistence for reconciled hourly records.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::observation::{Location, ReconciledRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Filters for listing stored records. `start` is inclusive, `end` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Receives a run's reconciled records. Records sharing a
/// `(lat, lon, time)` key replace each other entirely.
pub trait RecordSink {
    fn upsert_records(&mut self, records: &[ReconciledRecord]) -> Result<usize, StoreError>;
}

pub struct ObservationStore {
    conn: Connection,
}

impl ObservationStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            ",
        )?;
        ensure_schema(&conn)?;

        info!(
            component = "store",
            event = "store.open",
            path = %path.display()
        );
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn list(&self, query: &ObservationQuery) -> Result<Vec<ReconciledRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT
                lat,
                lon,
                time_ms,
                temperature_2m,
                apparent_temperature,
                apparent_diff,
                daily_max,
                daily_min
            FROM hourly_observations
            WHERE (?1 IS NULL OR lat = ?1)
              AND (?2 IS NULL OR lon = ?2)
              AND (?3 IS NULL OR time_ms >= ?3)
              AND (?4 IS NULL OR time_ms < ?4)
            ORDER BY lat ASC, lon ASC, time_ms ASC
            ",
        )?;

        let mut rows = stmt.query(params![
            query.lat,
            query.lon,
            query.start.map(|ts| ts.timestamp_millis()),
            query.end.map(|ts| ts.timestamp_millis()),
        ])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(record_from_row(row)?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM hourly_observations", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}

impl RecordSink for ObservationStore {
    fn upsert_records(&mut self, records: &[ReconciledRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO hourly_observations (
                    lat,
                    lon,
                    time_ms,
                    temperature_2m,
                    apparent_temperature,
                    apparent_diff,
                    daily_max,
                    daily_min
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(lat, lon, time_ms) DO UPDATE SET
                    temperature_2m = excluded.temperature_2m,
                    apparent_temperature = excluded.apparent_temperature,
                    apparent_diff = excluded.apparent_diff,
                    daily_max = excluded.daily_max,
                    daily_min = excluded.daily_min
                ",
            )?;

            for record in records {
                stmt.execute(params![
                    record.location.lat,
                    record.location.lon,
                    record.timestamp.timestamp_millis(),
                    record.temperature,
                    record.apparent_temperature,
                    record.apparent_diff,
                    record.daily_max,
                    record.daily_min,
                ])?;
            }
        }
        tx.commit()?;

        info!(
            component = "store",
            event = "store.upsert",
            records = records.len()
        );
        Ok(records.len())
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS hourly_observations (
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            time_ms INTEGER NOT NULL,
            temperature_2m REAL NOT NULL,
            apparent_temperature REAL NOT NULL,
            apparent_diff REAL NOT NULL,
            daily_max REAL NOT NULL,
            daily_min REAL NOT NULL,
            PRIMARY KEY(lat, lon, time_ms)
        ) WITHOUT ROWID;
        ",
    )?;
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> Result<ReconciledRecord, StoreError> {
    let time_ms: i64 = row.get(2)?;
    let timestamp = Utc
        .timestamp_millis_opt(time_ms)
        .single()
        .ok_or(StoreError::InvalidTimestamp(time_ms))?;

    Ok(ReconciledRecord {
        location: Location::new(row.get(0)?, row.get(1)?),
        timestamp,
        temperature: row.get(3)?,
        apparent_temperature: row.get(4)?,
        apparent_diff: row.get(5)?,
        daily_max: row.get(6)?,
        daily_min: row.get(7)?,
    })
}
