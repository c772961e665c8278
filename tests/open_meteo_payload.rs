use std::fs;

use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use luxtemp::{
    build_grid_as_of, parse_hourly_payload, reconcile, FetchError, GapPolicy, Location,
    ReconcileError,
};

const FIXTURE_PATH: &str = "tests/fixtures/open_meteo_hourly_sample.json";

fn fixture_bytes() -> Vec<u8> {
    fs::read(FIXTURE_PATH).expect("fixture should be readable")
}

fn fixture_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date expected")
}

#[test]
fn fixture_decodes_one_row_per_hour_with_null_kept_as_gap() {
    let here = Location::new(49.61, 6.12);
    let rows = parse_hourly_payload(here, &fixture_bytes()).expect("fixture should decode");

    assert_eq!(rows.len(), 24);
    assert!(rows.iter().all(|row| row.location == here));
    assert_eq!(
        rows[0].timestamp,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp")
    );
    assert_eq!(rows[0].temperature, Some(2.0));
    assert_eq!(rows[9].temperature, None);
    assert_eq!(rows[9].apparent_temperature, Some(2.5));
}

#[test]
fn fixture_with_null_hour_fails_strict_reconcile() {
    let here = Location::new(49.61, 6.12);
    let rows = parse_hourly_payload(here, &fixture_bytes()).expect("fixture should decode");
    let day = fixture_day();
    let grid = build_grid_as_of(day, day, None, day + ChronoDuration::days(7))
        .expect("grid should build");

    let err = reconcile(here, &rows, &grid, GapPolicy::Fail).expect_err("null hour must fail");
    assert_eq!(
        err,
        ReconcileError::MissingData {
            missing_points: 1,
            total_points: 24
        }
    );
}

#[test]
fn fixture_with_null_hour_reconciles_when_interpolating() {
    let here = Location::new(49.61, 6.12);
    let rows = parse_hourly_payload(here, &fixture_bytes()).expect("fixture should decode");
    let day = fixture_day();
    let grid = build_grid_as_of(day, day, None, day + ChronoDuration::days(7))
        .expect("grid should build");

    let outcome =
        reconcile(here, &rows, &grid, GapPolicy::Interpolate).expect("null hour should be filled");

    let filled = &outcome.records[9];
    assert!((filled.temperature - 5.6).abs() < 1e-9);
    assert_eq!(filled.apparent_diff, -3.1);
    assert_eq!(outcome.report.filled_points, 1);
    assert!(outcome.records.iter().all(|r| r.daily_min == 2.0));
}

#[test]
fn error_body_from_upstream_is_not_mistaken_for_data() {
    let payload = br#"{"error": true, "reason": "Cannot initialize WeatherVariable from invalid String value tempeature_2m"}"#;

    let err = parse_hourly_payload(Location::new(49.61, 6.12), payload)
        .expect_err("error document must be rejected");
    assert!(matches!(err, FetchError::MissingField(_)));
}

#[test]
fn truncated_document_is_a_json_error() {
    let bytes = fixture_bytes();
    let truncated = &bytes[..bytes.len() / 2];

    let err = parse_hourly_payload(Location::new(49.61, 6.12), truncated)
        .expect_err("truncated document must be rejected");
    assert!(matches!(err, FetchError::Json(_)));
}

#[cfg(feature = "live-open-meteo-tests")]
#[test]
#[ignore = "requires external network access"]
fn live_open_meteo_fetch_smoke() {
    use luxtemp::{FetchRequest, ObservationFetcher, OpenMeteoConfig, OpenMeteoFetcher};

    let end = Utc::now().date_naive() - ChronoDuration::days(2);
    let start = end - ChronoDuration::days(1);
    let req = FetchRequest::new(Location::new(49.61, 6.13), start, end);

    let fetcher = OpenMeteoFetcher::new(OpenMeteoConfig::default());
    let rows = fetcher.fetch_hourly(&req).expect("live fetch should succeed");

    assert_eq!(rows.len(), 48);
}
