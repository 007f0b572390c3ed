//! Environment configuration.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Operator settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Declarative config file or directory
    pub catalog_path: PathBuf,
    /// Address of the metrics and health server
    pub metrics_addr: SocketAddr,
    /// Resync and catalog refresh period; zero disables both
    pub resync: Duration,
    /// Backoff for the first retry of a failed key
    pub backoff_base: Duration,
    /// Backoff ceiling
    pub backoff_max: Duration,
    /// Worker tasks per queue
    pub workers: usize,
    pub log_format: LogFormat,
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; unset and empty values take
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "LOG_FORMAT must be \"text\" or \"json\", got {other:?}"
                )));
            }
        };

        let config = Self {
            namespace: get("WATCH_NAMESPACE"),
            catalog_path: get("CATALOG_PATH").map_or_else(|| PathBuf::from("/catalog"), PathBuf::from),
            metrics_addr: parse(&get, "METRICS_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            resync: Duration::from_secs(parse(&get, "RESYNC_SECONDS", 900)?),
            backoff_base: Duration::from_millis(parse(&get, "BACKOFF_BASE_MILLIS", 5)?),
            backoff_max: Duration::from_secs(parse(&get, "BACKOFF_MAX_SECONDS", 1000)?),
            workers: parse(&get, "WORKERS_PER_QUEUE", 1)?,
            log_format,
        };

        if config.workers == 0 {
            return Err(ControllerError::InvalidConfig("WORKERS_PER_QUEUE must be at least 1".to_string()));
        }
        if config.backoff_base > config.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_BASE_MILLIS ({:?}) exceeds BACKOFF_MAX_SECONDS ({:?})",
                config.backoff_base, config.backoff_max
            )));
        }
        Ok(config)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ControllerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.catalog_path, PathBuf::from("/catalog"));
        assert_eq!(config.metrics_addr.port(), 8080);
        assert_eq!(config.resync, Duration::from_secs(900));
        assert_eq!(config.backoff_base, Duration::from_millis(5));
        assert_eq!(config.backoff_max, Duration::from_secs(1000));
        assert_eq!(config.workers, 1);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("WATCH_NAMESPACE", "operators"),
            ("CATALOG_PATH", "/srv/catalog.json"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
            ("RESYNC_SECONDS", "0"),
            ("WORKERS_PER_QUEUE", "4"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("operators"));
        assert_eq!(config.catalog_path, PathBuf::from("/srv/catalog.json"));
        assert_eq!(config.metrics_addr, "127.0.0.1:9090".parse().unwrap());
        assert!(config.resync.is_zero());
        assert_eq!(config.workers, 4);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_empty_values_take_defaults() {
        let config = config(&[("WATCH_NAMESPACE", ""), ("LOG_FORMAT", " ")]).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for vars in [
            [("RESYNC_SECONDS", "soon")],
            [("METRICS_ADDR", "localhost")],
            [("WORKERS_PER_QUEUE", "0")],
            [("LOG_FORMAT", "yaml")],
            [("BACKOFF_BASE_MILLIS", "5000000")],
        ] {
            assert!(
                matches!(config(&vars), Err(ControllerError::InvalidConfig(_))),
                "{vars:?} should be rejected"
            );
        }
    }
}
