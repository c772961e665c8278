use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use luxtemp::{
    app_config_from_env, init_logging, log_app_start, logging_config_from_env, run_pipeline,
    AppRole, LoadRequest, Location, ObservationStore, OpenMeteoFetcher,
};

/// Loads hourly temperatures for one coordinate and date range into the
/// local store. Missing hours abort the run unless --interpolate-missing.
#[derive(Debug, Parser)]
#[command(name = "open_meteo_loader")]
struct Args {
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,
    /// YYYY-MM-DD or an RFC 3339 date-time (its UTC date is used)
    #[arg(long, alias = "start_date", value_parser = parse_date)]
    start_date: NaiveDate,
    /// YYYY-MM-DD or an RFC 3339 date-time (its UTC date is used)
    #[arg(long, alias = "end_date", value_parser = parse_date)]
    end_date: NaiveDate,
    #[arg(long, alias = "interpolate_missing")]
    interpolate_missing: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let app_cfg = app_config_from_env();
    log_app_start(AppRole::Loader, &logging_cfg, &app_cfg);

    let fetcher = OpenMeteoFetcher::new(app_cfg.open_meteo());
    let mut store = ObservationStore::open(&app_cfg.store_path)?;

    let req = LoadRequest {
        location: Location::new(args.lat, args.lon),
        start_date: args.start_date,
        end_date: args.end_date,
        interpolate_missing: args.interpolate_missing,
    };
    let summary = run_pipeline(&req, &fetcher, &mut store)?;

    println!(
        "Pipeline finished | store={} hours={} filled={} stored={} range={} -> {}",
        app_cfg.store_path.display(),
        summary.grid_points,
        summary.filled_points,
        summary.stored_records,
        summary.first.format("%Y-%m-%d %H:%M"),
        summary.last.format("%Y-%m-%d %H:%M"),
    );
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc).date_naive())
        .map_err(|_| format!("expected YYYY-MM-DD or an RFC 3339 date-time, got '{raw}'"))
}
