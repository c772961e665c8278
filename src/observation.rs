//! Observation and record types shared by the fetch, reconcile and store stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One hourly reading as returned by the upstream source.
///
/// `None` means the source answered with `null` for that hour; it is treated
/// the same way as an hour that is absent altogether.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub location: Location,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub apparent_temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    #[serde(flatten)]
    pub location: Location,
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "temperature_2m")]
    pub temperature: f64,
    pub apparent_temperature: f64,
    pub apparent_diff: f64,
    pub daily_max: f64,
    pub daily_min: f64,
}
