//! Aligns sparse hourly observations onto the canonical grid, applies the gap
//! policy and derives `apparent_diff` plus the per-day temperature extrema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::grid::HourlyGrid;
use crate::observation::{Location, RawObservation, ReconciledRecord};

const MAX_REPORTED_GAP_RANGES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapPolicy {
    Fail,
    Interpolate,
}

impl GapPolicy {
    pub fn from_interpolate_missing(interpolate_missing: bool) -> Self {
        if interpolate_missing {
            Self::Interpolate
        } else {
            Self::Fail
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub total_points: u64,
    pub observed_points: u64,
    pub missing_points: u64,
    pub filled_points: u64,
    pub duplicate_points_removed: u64,
    pub out_of_grid_points: u64,
    pub total_gap_ranges: u64,
    pub gap_ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub records: Vec<ReconciledRecord>,
    pub report: ReconcileReport,
}

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("data is missing for {missing_points} of {total_points} timestamps")]
    MissingData {
        missing_points: u64,
        total_points: u64,
    },
    #[error(
        "observation at {timestamp} is for ({found_lat}, {found_lon}), expected ({expected_lat}, {expected_lon})"
    )]
    LocationMismatch {
        timestamp: DateTime<Utc>,
        found_lat: f64,
        found_lon: f64,
        expected_lat: f64,
        expected_lon: f64,
    },
    #[error("no observed {field} value to interpolate from")]
    NoObservedValues { field: &'static str },
}

#[derive(Debug)]
struct AlignedColumns {
    temperature: Vec<Option<f64>>,
    apparent_temperature: Vec<Option<f64>>,
    duplicate_points_removed: u64,
    out_of_grid_points: u64,
}

/// Produces exactly one record per grid hour, in grid order, or fails as a
/// whole. `raw` is only read; the output never aliases it.
pub fn reconcile(
    location: Location,
    raw: &[RawObservation],
    grid: &HourlyGrid,
    policy: GapPolicy,
) -> Result<ReconcileOutcome, ReconcileError> {
    let aligned = align(location, raw, grid)?;

    let missing_mask: Vec<bool> = aligned
        .temperature
        .iter()
        .zip(&aligned.apparent_temperature)
        .map(|(t, a)| t.is_none() || a.is_none())
        .collect();
    let (gap_ranges, total_gap_ranges, missing_points) = gap_ranges(grid, &missing_mask);
    let total_points = grid.len() as u64;

    let mut report = ReconcileReport {
        total_points,
        observed_points: total_points - missing_points,
        missing_points,
        filled_points: 0,
        duplicate_points_removed: aligned.duplicate_points_removed,
        out_of_grid_points: aligned.out_of_grid_points,
        total_gap_ranges: total_gap_ranges as u64,
        gap_ranges,
    };

    if aligned.out_of_grid_points > 0 {
        debug!(
            component = "reconcile",
            event = "reconcile.out_of_grid_dropped",
            out_of_grid_points = aligned.out_of_grid_points
        );
    }

    if missing_points > 0 {
        info!(
            component = "reconcile",
            event = "reconcile.gap_detected",
            missing_points,
            total_points,
            total_gap_ranges = report.total_gap_ranges,
            policy = ?policy
        );
        if policy == GapPolicy::Fail {
            return Err(ReconcileError::MissingData {
                missing_points,
                total_points,
            });
        }
    }

    let times: Vec<i64> = grid.timestamps().iter().map(|ts| ts.timestamp()).collect();
    let temperature = interpolate_linear(&times, &aligned.temperature, "temperature")?;
    let apparent_temperature = interpolate_linear(
        &times,
        &aligned.apparent_temperature,
        "apparent_temperature",
    )?;

    if missing_points > 0 {
        report.filled_points = missing_points;
        warn!(
            component = "reconcile",
            event = "reconcile.gap_filled",
            filled_points = missing_points,
            total_points,
            "data is missing for {missing_points} of {total_points} timestamps; filled by interpolation"
        );
    }

    let records = derive_records(location, grid, &temperature, &apparent_temperature);

    info!(
        component = "reconcile",
        event = "reconcile.finish",
        total_points = report.total_points,
        observed_points = report.observed_points,
        filled_points = report.filled_points,
        duplicate_points_removed = report.duplicate_points_removed,
        out_of_grid_points = report.out_of_grid_points
    );

    Ok(ReconcileOutcome { records, report })
}

/// `round(value, 2)` with ties going to the even neighbour.
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn align(
    location: Location,
    raw: &[RawObservation],
    grid: &HourlyGrid,
) -> Result<AlignedColumns, ReconcileError> {
    let mut aligned = AlignedColumns {
        temperature: vec![None; grid.len()],
        apparent_temperature: vec![None; grid.len()],
        duplicate_points_removed: 0,
        out_of_grid_points: 0,
    };
    let mut seen = vec![false; grid.len()];

    for obs in raw {
        if obs.location != location {
            return Err(ReconcileError::LocationMismatch {
                timestamp: obs.timestamp,
                found_lat: obs.location.lat,
                found_lon: obs.location.lon,
                expected_lat: location.lat,
                expected_lon: location.lon,
            });
        }

        let Some(idx) = grid.position(obs.timestamp) else {
            aligned.out_of_grid_points += 1;
            continue;
        };
        if seen[idx] {
            aligned.duplicate_points_removed += 1;
        }
        seen[idx] = true;

        // Per field, the first usable value for an hour wins.
        let temperature = &mut aligned.temperature[idx];
        if temperature.is_none() {
            *temperature = obs.temperature.filter(|v| v.is_finite());
        }
        let apparent = &mut aligned.apparent_temperature[idx];
        if apparent.is_none() {
            *apparent = obs.apparent_temperature.filter(|v| v.is_finite());
        }
    }

    Ok(aligned)
}

fn gap_ranges(
    grid: &HourlyGrid,
    missing_mask: &[bool],
) -> (Vec<(DateTime<Utc>, DateTime<Utc>)>, usize, u64) {
    let mut full = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, missing) in missing_mask.iter().enumerate() {
        match (run_start, *missing) {
            (None, true) => run_start = Some(idx),
            (Some(start), false) => {
                full.push((start, idx - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        full.push((start, missing_mask.len() - 1));
    }

    let missing_points = full
        .iter()
        .map(|(start, end)| (end - start + 1) as u64)
        .sum();

    let total = full.len();
    let timestamps = grid.timestamps();
    let reported = full
        .into_iter()
        .take(MAX_REPORTED_GAP_RANGES)
        .map(|(start, end)| (timestamps[start], timestamps[end]))
        .collect();

    (reported, total, missing_points)
}

fn interpolate_linear(
    times: &[i64],
    values: &[Option<f64>],
    field: &'static str,
) -> Result<Vec<f64>, ReconcileError> {
    let known: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(idx, value)| value.map(|v| (idx, v)))
        .collect();
    if known.is_empty() {
        return Err(ReconcileError::NoObservedValues { field });
    }

    let mut out = Vec::with_capacity(values.len());
    let mut next_known = 0usize;

    for (idx, value) in values.iter().enumerate() {
        if let Some(v) = value {
            out.push(*v);
            continue;
        }

        while next_known < known.len() && known[next_known].0 < idx {
            next_known += 1;
        }
        let before = next_known.checked_sub(1).map(|k| known[k]);
        let after = known.get(next_known).copied();

        let filled = match (before, after) {
            (Some((lo_idx, lo_val)), Some((hi_idx, hi_val))) => {
                let span = (times[hi_idx] - times[lo_idx]) as f64;
                let offset = (times[idx] - times[lo_idx]) as f64;
                lo_val + (hi_val - lo_val) * offset / span
            }
            (Some((_, edge)), None) | (None, Some((_, edge))) => edge,
            (None, None) => return Err(ReconcileError::NoObservedValues { field }),
        };
        out.push(filled);
    }

    Ok(out)
}

fn derive_records(
    location: Location,
    grid: &HourlyGrid,
    temperature: &[f64],
    apparent_temperature: &[f64],
) -> Vec<ReconciledRecord> {
    let mut records: Vec<ReconciledRecord> = grid
        .timestamps()
        .iter()
        .zip(temperature.iter().zip(apparent_temperature))
        .map(|(ts, (t, a))| ReconciledRecord {
            location,
            timestamp: *ts,
            temperature: *t,
            apparent_temperature: *a,
            apparent_diff: round_to_hundredths(a - t),
            daily_max: *t,
            daily_min: *t,
        })
        .collect();

    // Grid order keeps each UTC day contiguous.
    for day in records.chunk_by_mut(|a, b| a.timestamp.date_naive() == b.timestamp.date_naive()) {
        let daily_max = day
            .iter()
            .map(|r| r.temperature)
            .fold(f64::NEG_INFINITY, f64::max);
        let daily_min = day
            .iter()
            .map(|r| r.temperature)
            .fold(f64::INFINITY, f64::min);
        for record in day.iter_mut() {
            record.daily_max = daily_max;
            record.daily_min = daily_min;
        }
    }

    records
}
