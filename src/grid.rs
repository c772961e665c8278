//! Canonical hourly grid for a requested date range.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const STEP_SECONDS: i64 = 3_600;
const LAST_HOUR_OF_DAY: i64 = 23;

/// Strictly increasing, gapless sequence of whole UTC hours. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyGrid {
    timestamps: Vec<DateTime<Utc>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("range ending {end_date} reaches the current day but no observations bound it")]
    NoLatestTimestamp { end_date: NaiveDate },
    #[error("timestamp {0} is not aligned to a whole hour")]
    UnalignedTimestamp(DateTime<Utc>),
}

impl HourlyGrid {
    /// Every hour from `first` through `last`, both inclusive.
    pub fn span(first: DateTime<Utc>, last: DateTime<Utc>) -> Result<Self, GridError> {
        if !is_hour_aligned(first) {
            return Err(GridError::UnalignedTimestamp(first));
        }
        if !is_hour_aligned(last) {
            return Err(GridError::UnalignedTimestamp(last));
        }
        if last < first {
            return Err(GridError::InvalidRange(format!(
                "grid end {last} precedes grid start {first}"
            )));
        }

        let points = (last - first).num_hours() + 1;
        let timestamps = (0..points)
            .map(|hour| first + ChronoDuration::hours(hour))
            .collect();

        Ok(Self { timestamps })
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn first(&self) -> DateTime<Utc> {
        self.timestamps[0]
    }

    pub fn last(&self) -> DateTime<Utc> {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Index of `ts` on the grid, or `None` when it is off-grid.
    pub fn position(&self, ts: DateTime<Utc>) -> Option<usize> {
        if !is_hour_aligned(ts) || ts < self.first() || ts > self.last() {
            return None;
        }
        Some((ts - self.first()).num_hours() as usize)
    }
}

/// Rejects `start_date > end_date` without needing any upstream data.
pub fn validate_range(start_date: NaiveDate, end_date: NaiveDate) -> Result<(), GridError> {
    if start_date > end_date {
        return Err(GridError::InvalidRange(format!(
            "start_date {start_date} is after end_date {end_date}"
        )));
    }
    Ok(())
}

pub fn build_grid(
    start_date: NaiveDate,
    end_date: NaiveDate,
    latest_available: Option<DateTime<Utc>>,
) -> Result<HourlyGrid, GridError> {
    build_grid_as_of(
        start_date,
        end_date,
        latest_available,
        Utc::now().date_naive(),
    )
}

/// Builds the grid as seen from the UTC calendar day `today`.
///
/// Ranges ending before `today` run through 23:00 of `end_date`. Ranges that
/// reach `today` or later stop at the latest hour the source actually
/// returned, so hours that cannot exist upstream yet never count as gaps.
pub fn build_grid_as_of(
    start_date: NaiveDate,
    end_date: NaiveDate,
    latest_available: Option<DateTime<Utc>>,
    today: NaiveDate,
) -> Result<HourlyGrid, GridError> {
    validate_range(start_date, end_date)?;

    let first = day_start(start_date);
    let end_of_range = day_start(end_date) + ChronoDuration::hours(LAST_HOUR_OF_DAY);
    let truncated = end_date >= today;

    let last = if truncated {
        let latest = latest_available.ok_or(GridError::NoLatestTimestamp { end_date })?;
        floor_to_hour(latest)
            .ok_or(GridError::UnalignedTimestamp(latest))?
            .min(end_of_range)
    } else {
        end_of_range
    };

    if last < first {
        return Err(GridError::InvalidRange(format!(
            "effective end {last} precedes start {first}"
        )));
    }

    let grid = HourlyGrid::span(first, last)?;
    debug!(
        component = "grid",
        event = "grid.build",
        start = %first,
        end = %last,
        truncated_to_latest = truncated,
        points = grid.len()
    );

    Ok(grid)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn floor_to_hour(ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs = ts.timestamp().div_euclid(STEP_SECONDS) * STEP_SECONDS;
    Utc.timestamp_opt(secs, 0).single()
}

fn is_hour_aligned(ts: DateTime<Utc>) -> bool {
    ts.timestamp().rem_euclid(STEP_SECONDS) == 0 && ts.timestamp_subsec_nanos() == 0
}
