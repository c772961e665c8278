//! One synchronous load run: fetch, grid, reconcile, persist.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::fetch::{FetchError, FetchRequest, ObservationFetcher};
use crate::grid::{build_grid_as_of, validate_range, GridError};
use crate::observation::Location;
use crate::reconcile::{reconcile, GapPolicy, ReconcileError};
use crate::store::{RecordSink, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub location: Location,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interpolate_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub grid_points: u64,
    pub fetched_rows: u64,
    pub filled_points: u64,
    pub stored_records: u64,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn run_pipeline(
    req: &LoadRequest,
    fetcher: &dyn ObservationFetcher,
    sink: &mut dyn RecordSink,
) -> Result<PipelineSummary, PipelineError> {
    run_pipeline_as_of(req, fetcher, sink, Utc::now().date_naive())
}

/// Runs the whole load as seen from the UTC day `today`. Nothing reaches the
/// sink unless every grid hour reconciled.
pub fn run_pipeline_as_of(
    req: &LoadRequest,
    fetcher: &dyn ObservationFetcher,
    sink: &mut dyn RecordSink,
    today: NaiveDate,
) -> Result<PipelineSummary, PipelineError> {
    info!(
        component = "pipeline",
        event = "pipeline.start",
        lat = req.location.lat,
        lon = req.location.lon,
        start_date = %req.start_date,
        end_date = %req.end_date,
        interpolate_missing = req.interpolate_missing
    );

    let result = run_stages(req, fetcher, sink, today);
    match &result {
        Ok(summary) => info!(
            component = "pipeline",
            event = "pipeline.finish",
            grid_points = summary.grid_points,
            filled_points = summary.filled_points,
            stored_records = summary.stored_records
        ),
        Err(err) => error!(
            component = "pipeline",
            event = "pipeline.error",
            error = %err
        ),
    }
    result
}

fn run_stages(
    req: &LoadRequest,
    fetcher: &dyn ObservationFetcher,
    sink: &mut dyn RecordSink,
    today: NaiveDate,
) -> Result<PipelineSummary, PipelineError> {
    validate_range(req.start_date, req.end_date)?;

    let fetch_req = FetchRequest::new(req.location, req.start_date, req.end_date);
    let raw = fetcher.fetch_hourly(&fetch_req)?;

    let latest = raw.iter().map(|obs| obs.timestamp).max();
    let grid = build_grid_as_of(req.start_date, req.end_date, latest, today)?;

    let policy = GapPolicy::from_interpolate_missing(req.interpolate_missing);
    let outcome = reconcile(req.location, &raw, &grid, policy)?;

    let stored = sink.upsert_records(&outcome.records)?;

    Ok(PipelineSummary {
        grid_points: outcome.report.total_points,
        fetched_rows: raw.len() as u64,
        filled_points: outcome.report.filled_points,
        stored_records: stored as u64,
        first: grid.first(),
        last: grid.last(),
    })
}
