//! Read-only HTTP listing of stored hourly observations.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{error, info};

use crate::observation::ReconciledRecord;
use crate::store::{ObservationQuery, ObservationStore, StoreError};

pub trait RecordSource: Send + Sync + 'static {
    fn list(&self, query: &ObservationQuery) -> Result<Vec<ReconciledRecord>, StoreError>;
}

/// Store handle shared between request handlers.
#[derive(Clone)]
pub struct SharedObservationStore {
    inner: Arc<Mutex<ObservationStore>>,
}

impl SharedObservationStore {
    pub fn new(store: ObservationStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&mut ObservationStore) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl RecordSource for SharedObservationStore {
    fn list(&self, query: &ObservationQuery) -> Result<Vec<ReconciledRecord>, StoreError> {
        self.with_store(|store| store.list(query))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservationListParams {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
}

impl ObservationListParams {
    pub fn to_query(&self) -> Result<ObservationQuery, String> {
        Ok(ObservationQuery {
            lat: self.lat,
            lon: self.lon,
            start: parse_param("start_datetime", self.start_datetime.as_deref())?,
            end: parse_param("end_datetime", self.end_datetime.as_deref())?,
        })
    }
}

pub fn observations_router(source: Arc<dyn RecordSource>) -> Router {
    Router::new()
        .route("/observations", get(list_observations))
        .with_state(ObservationsAppState { source })
}

/// Accepts RFC 3339, a naive date-time read as UTC, or a bare date at
/// midnight UTC.
pub fn parse_query_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

fn parse_param(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match raw {
        None => Ok(None),
        Some(value) => parse_query_datetime(value)
            .map(Some)
            .ok_or_else(|| format!("invalid {name}: '{value}'")),
    }
}

#[derive(Clone)]
struct ObservationsAppState {
    source: Arc<dyn RecordSource>,
}

async fn list_observations(
    State(state): State<ObservationsAppState>,
    Query(params): Query<ObservationListParams>,
) -> Result<Json<Vec<ReconciledRecord>>, (StatusCode, String)> {
    let query = params
        .to_query()
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;

    let rows = state.source.list(&query).map_err(|err| {
        error!(
            component = "observation_server",
            event = "http.observations.error",
            error = %err
        );
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;

    info!(
        component = "observation_server",
        event = "http.observations.request",
        lat = ?query.lat,
        lon = ?query.lon,
        rows = rows.len()
    );
    Ok(Json(rows))
}
