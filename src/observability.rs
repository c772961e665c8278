//! Logging setup plus the lifecycle events emitted by the loader and the
//! observation server.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{non_empty_var, parsed_var, switch_var, AppConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// The binary a lifecycle event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRole {
    Loader,
    Server,
}

impl AppRole {
    pub fn component(self) -> &'static str {
        match self {
            Self::Loader => "open_meteo_loader",
            Self::Server => "observation_server",
        }
    }
}

pub fn logging_config_from_env() -> LoggingConfig {
    let defaults = LoggingConfig::default();

    LoggingConfig {
        level: non_empty_var("LUXTEMP_LOG_LEVEL").unwrap_or(defaults.level),
        format: parsed_var("LUXTEMP_LOG_FORMAT").unwrap_or(defaults.format),
        include_target: switch_var("LUXTEMP_LOG_TARGET").unwrap_or(defaults.include_target),
    }
}

/// Installs the global subscriber. An unparseable level falls back to `info`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

/// Records the settings a binary runs with: the upstream endpoint for the
/// loader, the listen address for the server, the store path for both.
pub fn log_app_start(role: AppRole, logging: &LoggingConfig, app: &AppConfig) {
    match role {
        AppRole::Loader => info!(
            component = role.component(),
            event = "app.start",
            log_level = %logging.level,
            log_format = ?logging.format,
            endpoint_url = %app.endpoint_url,
            http_timeout_ms = app.http_timeout_ms,
            store_path = %app.store_path.display()
        ),
        AppRole::Server => info!(
            component = role.component(),
            event = "app.start",
            log_level = %logging.level,
            log_format = ?logging.format,
            store_path = %app.store_path.display(),
            server_addr = %app.server_addr
        ),
    }
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = AppRole::Server.component(),
        event = "app.bind",
        bind_addr = %bound_addr,
        route = "/observations"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::with_env_vars;

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_env_vars(
            &[
                ("LUXTEMP_LOG_LEVEL", None),
                ("LUXTEMP_LOG_FORMAT", None),
                ("LUXTEMP_LOG_TARGET", None),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn reads_level_format_and_target() {
        let cfg = with_env_vars(
            &[
                ("LUXTEMP_LOG_LEVEL", Some(" luxtemp=debug ")),
                ("LUXTEMP_LOG_FORMAT", Some("JSON")),
                ("LUXTEMP_LOG_TARGET", Some("off")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "luxtemp=debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn unknown_format_or_target_keeps_defaults() {
        let cfg = with_env_vars(
            &[
                ("LUXTEMP_LOG_LEVEL", Some("warn")),
                ("LUXTEMP_LOG_FORMAT", Some("yaml")),
                ("LUXTEMP_LOG_TARGET", Some("maybe")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "warn");
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert!(cfg.include_target);
    }

    #[test]
    fn roles_name_their_binaries() {
        assert_eq!(AppRole::Loader.component(), "open_meteo_loader");
        assert_eq!(AppRole::Server.component(), "observation_server");
        assert!("toml".parse::<LogFormat>().is_err());
    }
}
