use std::{env, path::PathBuf, time::Duration};

use kubescan_core::{
    DatabaseKind, ScanError, ServiceSettings, notify::DEFAULT_SUBSCRIBER_BUFFER,
};
use thiserror::Error;

const DEFAULT_SCAN_LABEL: &str = "security-scan";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error(transparent)]
    Database(#[from] ScanError),
}

/// Server configuration loaded from environment variables (and an optional
/// `.env` file).
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Database settings
    pub database_type: DatabaseKind,
    pub dsn: String,

    // Scheduling settings
    pub namespaces: Vec<String>,
    pub scan_label: String,
    pub job_template_path: Option<PathBuf>,
    pub idle_requeue: Duration,
    pub poll_interval: Duration,

    // Notification settings
    pub subscriber_buffer: usize,

    // HTTP settings
    /// Upper bound on `PUT /scan-results` bodies; `None` means unlimited.
    pub max_report_bytes: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_type = lookup("DATABASE_TYPE")
            .ok_or(ConfigError::Missing("DATABASE_TYPE"))?
            .parse::<DatabaseKind>()?;
        let dsn = lookup("DSN")
            .filter(|dsn| !dsn.trim().is_empty())
            .ok_or(ConfigError::Missing("DSN"))?;

        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                key: "SERVER_PORT",
                message: format!("{e}"),
            })?,
            None => 8000,
        };

        let namespaces: Vec<String> = lookup("SCAN_NAMESPACES")
            .unwrap_or_else(|| "default".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if namespaces.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SCAN_NAMESPACES",
                message: "at least one namespace is required".to_string(),
            });
        }

        let subscriber_buffer = match lookup("SUBSCRIBER_BUFFER") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "SUBSCRIBER_BUFFER",
                    message: format!("expected a positive integer, got '{raw}'"),
                })?,
            None => DEFAULT_SUBSCRIBER_BUFFER,
        };

        let max_report_bytes = match lookup("MAX_REPORT_BYTES") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ConfigError::Invalid {
                        key: "MAX_REPORT_BYTES",
                        message: format!("expected a positive byte count, got '{raw}'"),
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
            database_type,
            dsn,
            namespaces,
            scan_label: lookup("SCAN_LABEL").unwrap_or_else(|| DEFAULT_SCAN_LABEL.to_string()),
            job_template_path: lookup("JOB_TEMPLATE_PATH").map(PathBuf::from),
            idle_requeue: parse_duration(&lookup, "SCAN_IDLE_REQUEUE", Duration::from_secs(10))?,
            poll_interval: parse_duration(&lookup, "SCAN_POLL_INTERVAL", Duration::from_secs(5))?,
            subscriber_buffer,
            max_report_bytes,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        let mut settings = ServiceSettings::new(self.database_type, self.dsn.clone());
        settings.job_template = self.job_template_path.clone();
        settings.subscriber_buffer = self.subscriber_buffer;
        settings
    }
}

fn parse_duration<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn applies_defaults() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_TYPE", "sqlite"), ("DSN", "sqlite::memory:")]))
                .unwrap();
        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.server_port, 8000);
        assert_eq!(config.namespaces, vec!["default"]);
        assert_eq!(config.scan_label, "security-scan");
        assert_eq!(config.idle_requeue, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.subscriber_buffer, 1);
        assert!(config.job_template_path.is_none());
        assert_eq!(config.max_report_bytes, None);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_TYPE", "postgres"),
            ("DSN", "postgres://scanner@db/scans"),
            ("SERVER_PORT", "9090"),
            ("SCAN_NAMESPACES", "team-a, team-b,,"),
            ("SCAN_IDLE_REQUEUE", "1m"),
            ("SCAN_POLL_INTERVAL", "500ms"),
            ("SUBSCRIBER_BUFFER", "16"),
            ("JOB_TEMPLATE_PATH", "/etc/kubescan/job.yaml"),
            ("MAX_REPORT_BYTES", "67108864"),
        ]))
        .unwrap();
        assert_eq!(config.database_type, DatabaseKind::Postgres);
        assert_eq!(config.server_port, 9090);
        assert_eq!(config.namespaces, vec!["team-a", "team-b"]);
        assert_eq!(config.idle_requeue, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.max_report_bytes, Some(64 * 1024 * 1024));

        let settings = config.service_settings();
        assert_eq!(settings.subscriber_buffer, 16);
        assert_eq!(
            settings.job_template,
            Some(PathBuf::from("/etc/kubescan/job.yaml"))
        );
    }

    #[test]
    fn requires_database_settings() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("DSN", "x")])),
            Err(ConfigError::Missing("DATABASE_TYPE"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("DATABASE_TYPE", "sqlite")])),
            Err(ConfigError::Missing("DSN"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("DATABASE_TYPE", "mysql"), ("DSN", "x")])),
            Err(ConfigError::Database(_))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        let base = [("DATABASE_TYPE", "sqlite"), ("DSN", "sqlite::memory:")];
        for (key, value) in [
            ("SERVER_PORT", "http"),
            ("SCAN_POLL_INTERVAL", "soon"),
            ("SUBSCRIBER_BUFFER", "0"),
            ("SCAN_NAMESPACES", " , "),
            ("MAX_REPORT_BYTES", "0"),
        ] {
            let mut vars = base.to_vec();
            vars.push((key, value));
            assert!(
                matches!(
                    Config::from_lookup(lookup(&vars)),
                    Err(ConfigError::Invalid { .. })
                ),
                "{key}={value} should be rejected"
            );
        }
    }
}
