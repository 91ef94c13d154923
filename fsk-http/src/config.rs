use std::{env, path::PathBuf, str::FromStr, time::Duration};

use tracing::level_filters::LevelFilter;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 50;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TO_FILE_BINARY: &str = "/ggwave/build/bin/ggwave-to-file";
const DEFAULT_FROM_FILE_BINARY: &str = "/ggwave/build/bin/ggwave-from-file";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
const MAX_DEFAULT_WORKERS: usize = 32;

/// Process-wide settings, resolved once at startup and never mutated.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Bind host; an IP literal or a resolvable name.
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub max_workers: usize,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub to_file_binary: PathBuf,
    pub from_file_binary: PathBuf,
    pub log_level: String,
    pub health_check_enabled: bool,
    pub cleanup_interval: Duration,
    pub temp_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug: false,
            max_workers: default_max_workers(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            to_file_binary: PathBuf::from(DEFAULT_TO_FILE_BINARY),
            from_file_binary: PathBuf::from(DEFAULT_FROM_FILE_BINARY),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            health_check_enabled: true,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            temp_dir: env::temp_dir(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    Zero { key: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            ConfigError::Zero { key } => write!(f, "{key} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset or blank
    /// keys fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            host: get("FSK_HOST").unwrap_or(defaults.host),
            port: parse_or("FSK_PORT", get("FSK_PORT"), defaults.port)?,
            debug: parse_bool_or("FSK_DEBUG", get("FSK_DEBUG"), defaults.debug)?,
            max_workers: nonzero(
                "MAX_WORKERS",
                parse_or("MAX_WORKERS", get("MAX_WORKERS"), defaults.max_workers)?,
            )?,
            max_concurrent_requests: nonzero(
                "MAX_CONCURRENT_REQUESTS",
                parse_or(
                    "MAX_CONCURRENT_REQUESTS",
                    get("MAX_CONCURRENT_REQUESTS"),
                    defaults.max_concurrent_requests,
                )?,
            )?,
            request_timeout: Duration::from_secs(nonzero(
                "REQUEST_TIMEOUT",
                parse_or(
                    "REQUEST_TIMEOUT",
                    get("REQUEST_TIMEOUT"),
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                )?,
            )?),
            to_file_binary: get("GGWAVE_TO_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.to_file_binary),
            from_file_binary: get("GGWAVE_FROM_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.from_file_binary),
            log_level: match get("LOG_LEVEL") {
                Some(value) => parse_log_level(&value)?,
                None => defaults.log_level,
            },
            health_check_enabled: parse_bool_or(
                "HEALTH_CHECK_ENABLED",
                get("HEALTH_CHECK_ENABLED"),
                defaults.health_check_enabled,
            )?,
            cleanup_interval: Duration::from_secs(nonzero(
                "TEMP_FILE_CLEANUP_INTERVAL",
                parse_or(
                    "TEMP_FILE_CLEANUP_INTERVAL",
                    get("TEMP_FILE_CLEANUP_INTERVAL"),
                    DEFAULT_CLEANUP_INTERVAL_SECS,
                )?,
            )?),
            temp_dir: get("FSK_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
        };
        Ok(config)
    }

    /// Log filter directive used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &str {
        if self.debug { "debug" } else { &self.log_level }
    }
}

fn default_max_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|value| value.get())
        .unwrap_or(1);
    (cpus + 4).min(MAX_DEFAULT_WORKERS)
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_bool_or(
    key: &'static str,
    value: Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, &value)),
    }
}

/// Accepts tracing level names plus the `warning`, `critical` and `fatal`
/// spellings, normalised to a tracing level.
fn parse_log_level(value: &str) -> Result<String, ConfigError> {
    let lowered = value.to_ascii_lowercase();
    let level = match lowered.as_str() {
        "warning" => "warn",
        "critical" | "fatal" => "error",
        other => other,
    };
    match LevelFilter::from_str(level) {
        Ok(filter) => Ok(filter.to_string().to_ascii_lowercase()),
        Err(_) => Err(invalid("LOG_LEVEL", value)),
    }
}

fn nonzero<T: PartialEq + Default>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(ConfigError::Zero { key })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = ServiceConfig::from_lookup(|_| None).expect("defaults should load");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent_requests, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.cleanup_interval, Duration::from_secs(300));
        assert!(config.health_check_enabled);
        assert!(!config.debug);
        assert!(config.max_workers >= 1 && config.max_workers <= 32);
        assert_eq!(
            config.to_file_binary,
            PathBuf::from("/ggwave/build/bin/ggwave-to-file")
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("FSK_HOST", "127.0.0.1"),
            ("FSK_PORT", "9000"),
            ("MAX_CONCURRENT_REQUESTS", "4"),
            ("REQUEST_TIMEOUT", "7"),
            ("HEALTH_CHECK_ENABLED", "False"),
            ("LOG_LEVEL", "WARN"),
            ("GGWAVE_FROM_FILE", "/opt/decoder"),
        ]))
        .expect("config should load");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert!(!config.health_check_enabled);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.from_file_binary, PathBuf::from("/opt/decoder"));
    }

    #[test]
    fn debug_flag_forces_debug_filter() {
        let config = ServiceConfig::from_lookup(lookup(&[("FSK_DEBUG", "true")]))
            .expect("config should load");
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn host_names_are_accepted() {
        let config = ServiceConfig::from_lookup(lookup(&[("FSK_HOST", "localhost")]))
            .expect("host name should load");
        assert_eq!(config.host, "localhost");
        assert_eq!(
            ServiceConfig::from_lookup(|_| None)
                .expect("defaults should load")
                .host,
            "0.0.0.0"
        );
    }

    #[test]
    fn level_aliases_map_onto_tracing_levels() {
        for (raw, expected) in [
            ("WARNING", "warn"),
            ("CRITICAL", "error"),
            ("fatal", "error"),
            ("INFO", "info"),
            ("Debug", "debug"),
        ] {
            let config = ServiceConfig::from_lookup(lookup(&[("LOG_LEVEL", raw)]))
                .expect("level should load");
            assert_eq!(config.log_level, expected, "LOG_LEVEL={raw}");
            assert_eq!(config.log_filter(), expected);
        }
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[("LOG_LEVEL", "chatty")]))
            .expect_err("level should be rejected");
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "LOG_LEVEL",
                value: "chatty".to_string()
            }
        );
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[("FSK_PORT", "eighty")]))
            .expect_err("port should be rejected");
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "FSK_PORT",
                value: "eighty".to_string()
            }
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[("MAX_CONCURRENT_REQUESTS", "0")]))
            .expect_err("zero should be rejected");
        assert_eq!(
            err,
            ConfigError::Zero {
                key: "MAX_CONCURRENT_REQUESTS"
            }
        );
    }
}
