//! luxtemp core crate.
//!
//! Hourly temperature loading for a coordinate and date range:
//! - canonical hourly grid construction
//! - gap detection with fill-or-fail reconciliation and derived daily fields
//! - Open-Meteo fetching, SQLite persistence and a read-only listing route

mod api;
mod config;
mod fetch;
mod grid;
mod observability;
mod observation;
mod pipeline;
mod reconcile;
mod store;
#[cfg(test)]
mod test_support;

pub use api::{
    observations_router, parse_query_datetime, ObservationListParams, RecordSource,
    SharedObservationStore,
};
pub use config::{app_config_from_env, AppConfig};
pub use fetch::{
    build_request_url, parse_hourly_payload, FetchError, FetchRequest, ObservationFetcher,
    OpenMeteoConfig, OpenMeteoFetcher, APPARENT_TEMPERATURE_FIELD, OPEN_METEO_API_URL,
    TEMPERATURE_FIELD,
};
pub use grid::{build_grid, build_grid_as_of, validate_range, GridError, HourlyGrid};
pub use observability::{
    init_logging, log_app_bind, log_app_start, logging_config_from_env, AppRole, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use observation::{Location, RawObservation, ReconciledRecord};
pub use pipeline::{run_pipeline, run_pipeline_as_of, LoadRequest, PipelineError, PipelineSummary};
pub use reconcile::{
    reconcile, round_to_hundredths, GapPolicy, ReconcileError, ReconcileOutcome, ReconcileReport,
};
pub use store::{ObservationQuery, ObservationStore, RecordSink, StoreError};
