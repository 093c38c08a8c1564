use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Scheduling, probing and retry knobs for the check pipeline.
#[derive(Clone, Debug, Deserialize)]
pub struct MonitoringConfig {
    /// Lower bound applied to every target's poll interval.
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// Per-probe timeout. Must stay below `min_interval_secs`.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Attempts per pipeline invocation, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl MonitoringConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval_secs < 2 {
            return Err(ConfigError::Validation(
                "monitoring.min_interval_secs must be at least 2".into(),
            ));
        }
        if self.probe_timeout_ms == 0 || self.probe_timeout_ms >= self.min_interval_secs * 1000 {
            return Err(ConfigError::Validation(
                "monitoring.probe_timeout_ms must be > 0 and shorter than min_interval_secs".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "monitoring.max_attempts must be >= 1".into(),
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Validation(
                "monitoring.broadcast_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Per-client request limit on the HTTP API.
#[derive(Clone, Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rate_limit_requests")]
    pub requests_per_window: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: default_rate_limit_requests(),
            window_secs: default_rate_limit_window_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Email alerts are disabled when no SMTP relay is configured.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(smtp) = &self.smtp
            && smtp.port == 0
        {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.requests_per_window == 0 || self.rate_limit.window_secs == 0)
        {
            return Err(ConfigError::Validation(
                "rate_limit.requests_per_window and rate_limit.window_secs must be > 0".into(),
            ));
        }
        self.monitoring.validate()
    }
}

fn default_true() -> bool {
    true
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_min_interval_secs() -> u64 {
    10
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_broadcast_capacity() -> usize {
    256
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `SMTP__PORT`, `MONITORING__PROBE_TIMEOUT_MS`) overrides
/// the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize")
    }

    #[test]
    fn monitoring_defaults_apply() {
        let cfg = parse("database_url: \"sqlite::memory:\"\n");
        assert_eq!(cfg.monitoring.min_interval_secs, 10);
        assert_eq!(cfg.monitoring.probe_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.monitoring.max_attempts, 3);
        assert_eq!(cfg.bind_address, "0.0.0.0:8080");
        assert!(cfg.smtp.is_none());
        assert!(cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.requests_per_window, 100);
        assert_eq!(cfg.rate_limit.window(), Duration::from_secs(60));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn enabled_rate_limit_needs_a_budget() {
        let cfg = parse(
            r#"
database_url: "sqlite::memory:"
rate_limit:
  requests_per_window: 0
"#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn probe_timeout_must_be_below_floor() {
        let cfg = parse(
            r#"
database_url: "sqlite::memory:"
monitoring:
  min_interval_secs: 5
  probe_timeout_ms: 5000
"#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_attempts_rejected() {
        let cfg = parse(
            r#"
database_url: "sqlite::memory:"
monitoring:
  max_attempts: 0
"#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn smtp_port_zero_rejected() {
        let cfg = parse(
            r#"
database_url: "sqlite::memory:"
smtp:
  server: "smtp.example.com"
  port: 0
  username: "u"
  password: "p"
  from: "monitor@example.com"
"#,
        );
        assert!(cfg.validate().is_err());
    }
}
