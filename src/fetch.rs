//! Hourly observation fetching from the Open-Meteo forecast API.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::observation::{Location, RawObservation};

pub const OPEN_METEO_API_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const TEMPERATURE_FIELD: &str = "temperature_2m";
pub const APPARENT_TEMPERATURE_FIELD: &str = "apparent_temperature";

const TIME_FIELD: &str = "time";
const HOURLY_FIELDS: [&str; 2] = [TEMPERATURE_FIELD, APPARENT_TEMPERATURE_FIELD];
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Always asks for `temperature_2m` and `apparent_temperature`, the two
/// columns `parse_hourly_payload` reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub location: Location,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl FetchRequest {
    pub fn new(location: Location, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            location,
            start_date,
            end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMeteoConfig {
    pub endpoint_url: String,
    pub http_timeout_ms: u64,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            endpoint_url: OPEN_METEO_API_URL.to_string(),
            http_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("invalid endpoint URL '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("error when fetching data from {url}: status {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is missing field '{0}'")]
    MissingField(String),
    #[error("hourly column '{field}' has {found} values, expected {expected}")]
    ColumnLengthMismatch {
        field: String,
        found: usize,
        expected: usize,
    },
    #[error("failed to parse timestamp '{0}'")]
    ParseTimestamp(String),
    #[error("failed to parse field {field} value '{value}'")]
    ParseValue { field: String, value: String },
}

/// Source of raw hourly observations for one location and date range.
pub trait ObservationFetcher {
    fn fetch_hourly(&self, req: &FetchRequest) -> Result<Vec<RawObservation>, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct OpenMeteoFetcher {
    cfg: OpenMeteoConfig,
}

impl OpenMeteoFetcher {
    pub fn new(cfg: OpenMeteoConfig) -> Self {
        Self { cfg }
    }
}

impl ObservationFetcher for OpenMeteoFetcher {
    fn fetch_hourly(&self, req: &FetchRequest) -> Result<Vec<RawObservation>, FetchError> {
        let http = ReqwestBlockingFetcher::new(self.cfg.http_timeout_ms)?;
        fetch_hourly_with_fetcher(req, &self.cfg, &http)
    }
}

/// Query values are form-encoded, so the field separator goes out as `%2C`.
pub fn build_request_url(req: &FetchRequest, cfg: &OpenMeteoConfig) -> Result<Url, FetchError> {
    Url::parse_with_params(
        &cfg.endpoint_url,
        &[
            ("latitude", req.location.lat.to_string()),
            ("longitude", req.location.lon.to_string()),
            ("hourly", HOURLY_FIELDS.join(",")),
            ("start_date", req.start_date.format("%Y-%m-%d").to_string()),
            ("end_date", req.end_date.format("%Y-%m-%d").to_string()),
        ],
    )
    .map_err(|err| FetchError::InvalidEndpoint {
        url: cfg.endpoint_url.clone(),
        message: err.to_string(),
    })
}

/// Decodes the `hourly` block of an Open-Meteo response into observations
/// for `location`. `null` values become `None`; any other non-numeric value
/// is an error.
pub fn parse_hourly_payload(
    location: Location,
    payload: &[u8],
) -> Result<Vec<RawObservation>, FetchError> {
    let root: Value = serde_json::from_slice(payload)?;
    let hourly = root
        .get("hourly")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::MissingField("hourly".to_string()))?;

    let times = column(hourly, TIME_FIELD)?;
    let temperature = column(hourly, TEMPERATURE_FIELD)?;
    let apparent = column(hourly, APPARENT_TEMPERATURE_FIELD)?;

    for (field, values) in [
        (TEMPERATURE_FIELD, temperature),
        (APPARENT_TEMPERATURE_FIELD, apparent),
    ] {
        if values.len() != times.len() {
            return Err(FetchError::ColumnLengthMismatch {
                field: field.to_string(),
                found: values.len(),
                expected: times.len(),
            });
        }
    }

    let mut rows = Vec::with_capacity(times.len());
    for ((time, t), a) in times.iter().zip(temperature).zip(apparent) {
        rows.push(RawObservation {
            location,
            timestamp: parse_timestamp(time)?,
            temperature: parse_value(TEMPERATURE_FIELD, t)?,
            apparent_temperature: parse_value(APPARENT_TEMPERATURE_FIELD, a)?,
        });
    }

    Ok(rows)
}

fn fetch_hourly_with_fetcher(
    req: &FetchRequest,
    cfg: &OpenMeteoConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<Vec<RawObservation>, FetchError> {
    let url = build_request_url(req, cfg)?;
    info!(
        component = "fetch",
        event = "fetch.start",
        url = %url,
        start_date = %req.start_date,
        end_date = %req.end_date
    );

    let body = fetcher.get_bytes(url.as_str())?;
    debug!(component = "fetch", event = "fetch.response", bytes = body.len());

    let rows = parse_hourly_payload(req.location, &body)?;
    info!(
        component = "fetch",
        event = "fetch.finish",
        rows = rows.len()
    );

    Ok(rows)
}

fn column<'a>(
    hourly: &'a serde_json::Map<String, Value>,
    field: &str,
) -> Result<&'a Vec<Value>, FetchError> {
    hourly
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::MissingField(format!("hourly.{field}")))
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, FetchError> {
    let raw = value
        .as_str()
        .ok_or_else(|| FetchError::ParseTimestamp(value.to_string()))?;

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(FetchError::ParseTimestamp(raw.to_string()))
}

fn parse_value(field: &str, value: &Value) -> Result<Option<f64>, FetchError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number.as_f64().map(Some).ok_or_else(|| FetchError::ParseValue {
            field: field.to_string(),
            value: number.to_string(),
        }),
        other => Err(FetchError::ParseValue {
            field: field.to_string(),
            value: other.to_string(),
        }),
    }
}

trait HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    fn new(timeout_ms: u64) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| FetchError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| FetchError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    impl MockFetcher {
        fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.responses.insert(url.to_string(), body.to_vec());
            self
        }
    }

    impl HttpFetcher for MockFetcher {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::HttpStatus {
                    url: url.to_string(),
                    status: 400,
                    body: "{\"error\":true,\"reason\":\"missing mock response\"}".to_string(),
                })
        }
    }

    fn sample_req() -> FetchRequest {
        FetchRequest::new(
            Location::new(49.61, 6.13),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
    }

    #[test]
    fn request_url_carries_location_fields_and_dates() {
        let url = build_request_url(&sample_req(), &OpenMeteoConfig::default()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.open-meteo.com/v1/forecast?latitude=49.61&longitude=6.13&hourly=temperature_2m%2Capparent_temperature&start_date=2024-01-01&end_date=2024-01-02"
        );

        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["hourly"], "temperature_2m,apparent_temperature");
    }

    #[test]
    fn request_url_for_southern_western_location_keeps_signs() {
        let req = FetchRequest::new(
            Location::new(-33.87, -70.65),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        );
        let url = build_request_url(&req, &OpenMeteoConfig::default()).unwrap();

        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["latitude"], "-33.87");
        assert_eq!(pairs["longitude"], "-70.65");
    }

    #[test]
    fn unparseable_endpoint_is_rejected_before_any_request() {
        let cfg = OpenMeteoConfig {
            endpoint_url: "not a url".to_string(),
            ..OpenMeteoConfig::default()
        };
        let fetcher = MockFetcher::default();

        let err = fetch_hourly_with_fetcher(&sample_req(), &cfg, &fetcher).unwrap_err();
        assert!(matches!(err, FetchError::InvalidEndpoint { .. }));
    }

    #[test]
    fn payload_nulls_become_missing_cells() {
        let payload = br#"{
            "latitude": 49.6,
            "hourly": {
                "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                "temperature_2m": [1.5, null],
                "apparent_temperature": [-0.5, -1.0]
            }
        }"#;

        let rows = parse_hourly_payload(Location::new(49.61, 6.13), payload).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
        );
        assert_eq!(rows[0].temperature, Some(1.5));
        assert_eq!(rows[1].temperature, None);
        assert_eq!(rows[1].apparent_temperature, Some(-1.0));
    }

    #[test]
    fn payload_strings_in_value_columns_are_contract_violations() {
        let payload = br#"{"hourly": {
            "time": ["2024-01-01T00:00"],
            "temperature_2m": ["warm"],
            "apparent_temperature": [1.0]
        }}"#;

        let err = parse_hourly_payload(Location::new(0.0, 0.0), payload).unwrap_err();
        assert!(matches!(err, FetchError::ParseValue { .. }));
    }

    #[test]
    fn payload_with_bad_timestamp_or_ragged_columns_is_rejected() {
        let bad_time = br#"{"hourly": {
            "time": ["yesterday"],
            "temperature_2m": [1.0],
            "apparent_temperature": [1.0]
        }}"#;
        assert!(matches!(
            parse_hourly_payload(Location::new(0.0, 0.0), bad_time).unwrap_err(),
            FetchError::ParseTimestamp(_)
        ));

        let ragged = br#"{"hourly": {
            "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
            "temperature_2m": [1.0],
            "apparent_temperature": [1.0, 2.0]
        }}"#;
        assert!(matches!(
            parse_hourly_payload(Location::new(0.0, 0.0), ragged).unwrap_err(),
            FetchError::ColumnLengthMismatch { found: 1, expected: 2, .. }
        ));
    }

    #[test]
    fn missing_hourly_block_is_rejected() {
        let err = parse_hourly_payload(Location::new(0.0, 0.0), br#"{"error": true}"#).unwrap_err();
        assert!(matches!(err, FetchError::MissingField(field) if field == "hourly"));
    }

    #[test]
    fn fetch_uses_configured_endpoint_and_surfaces_upstream_errors() {
        let req = sample_req();
        let cfg = OpenMeteoConfig {
            endpoint_url: "http://localhost:9/v1/forecast".to_string(),
            ..OpenMeteoConfig::default()
        };
        let url = build_request_url(&req, &cfg).unwrap();
        let fetcher = MockFetcher::default().with(
            url.as_str(),
            br#"{"hourly": {"time": ["2024-01-01T00:00"], "temperature_2m": [2.0], "apparent_temperature": [0.5]}}"#,
        );

        let rows = fetch_hourly_with_fetcher(&req, &cfg, &fetcher).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].location, req.location);

        let other_cfg = OpenMeteoConfig::default();
        let err = fetch_hourly_with_fetcher(&req, &other_cfg, &fetcher).unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 400, .. }));
    }
}
