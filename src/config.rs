//! Environment-driven runtime configuration for the loader and the server.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::fetch::{OpenMeteoConfig, OPEN_METEO_API_URL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub endpoint_url: String,
    pub http_timeout_ms: u64,
    pub store_path: PathBuf,
    pub server_addr: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint_url: OPEN_METEO_API_URL.to_string(),
            http_timeout_ms: 15_000,
            store_path: PathBuf::from("data/luxtemp.sqlite"),
            server_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

impl AppConfig {
    pub fn open_meteo(&self) -> OpenMeteoConfig {
        OpenMeteoConfig {
            endpoint_url: self.endpoint_url.clone(),
            http_timeout_ms: self.http_timeout_ms,
        }
    }
}

/// Unset, blank or unparseable variables keep their defaults.
pub fn app_config_from_env() -> AppConfig {
    let defaults = AppConfig::default();

    AppConfig {
        endpoint_url: non_empty_var("LUXTEMP_OPEN_METEO_URL").unwrap_or(defaults.endpoint_url),
        http_timeout_ms: parsed_var::<u64>("LUXTEMP_HTTP_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .unwrap_or(defaults.http_timeout_ms),
        store_path: non_empty_var("LUXTEMP_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.store_path),
        server_addr: parsed_var("LUXTEMP_SERVER_ADDR").unwrap_or(defaults.server_addr),
    }
}

/// Trimmed value of `key`, or `None` when unset or blank.
pub(crate) fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub(crate) fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    non_empty_var(key)?.parse().ok()
}

/// Accepts `1/0`, `true/false`, `yes/no` and `on/off` in any case.
pub(crate) fn switch_var(key: &str) -> Option<bool> {
    match non_empty_var(key)?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
