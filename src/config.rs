//! Configuration types for kelly-gate

use crate::risk::RiskLimits;
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML or has unknown fields
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of its allowed range
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub limits: RiskLimits,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Portfolio state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortfolioConfig {
    /// Starting cash balance
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,

    /// Maximum retained observations per return series and equity history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Bounded queue size for writer commands
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Single-tick moves larger than this fraction are marked but excluded from returns
    #[serde(default = "default_max_tick_move")]
    pub max_tick_move: Decimal,
}

fn default_initial_cash() -> Decimal {
    Decimal::new(100_000, 0)
}
fn default_history_capacity() -> usize {
    1024
}
fn default_command_buffer() -> usize {
    1024
}
fn default_max_tick_move() -> Decimal {
    Decimal::new(5, 1) // 0.5 = 50%
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            history_capacity: default_history_capacity(),
            command_buffer: default_command_buffer(),
            max_tick_move: default_max_tick_move(),
        }
    }
}

/// Risk monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Recomputation interval, also the computation budget per tick
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Drawdown alert fires at alert_threshold * max_drawdown
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: Decimal,

    /// VaR (loss fraction of equity) above which an alert fires
    #[serde(default)]
    pub var_limit: Option<Decimal>,

    /// Alert channel capacity
    #[serde(default = "default_alert_buffer")]
    pub alert_buffer: usize,
}

fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_alert_threshold() -> Decimal {
    Decimal::new(8, 1) // 0.8
}
fn default_alert_buffer() -> usize {
    64
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            alert_threshold: default_alert_threshold(),
            var_limit: None,
            alert_buffer: default_alert_buffer(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port, disabled when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

/// Decision audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_audit_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_rotation_interval_secs")]
    pub rotation_interval_secs: u64,
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("./audit")
}
fn default_audit_buffer() -> usize {
    500
}
fn default_flush_interval_secs() -> u64 {
    30
}
fn default_rotation_interval_secs() -> u64 {
    3600
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: default_audit_dir(),
            buffer_size: default_audit_buffer(),
            flush_interval_secs: default_flush_interval_secs(),
            rotation_interval_secs: default_rotation_interval_secs(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;

        if self.portfolio.initial_cash <= Decimal::ZERO {
            return Err(ConfigError::invalid(
                "portfolio.initial_cash",
                "must be positive",
            ));
        }
        if self.portfolio.history_capacity < self.limits.var_window {
            return Err(ConfigError::invalid(
                "portfolio.history_capacity",
                format!(
                    "must be at least limits.var_window ({})",
                    self.limits.var_window
                ),
            ));
        }
        if self.portfolio.command_buffer == 0 {
            return Err(ConfigError::invalid(
                "portfolio.command_buffer",
                "must be positive",
            ));
        }
        if self.portfolio.max_tick_move <= Decimal::ZERO {
            return Err(ConfigError::invalid(
                "portfolio.max_tick_move",
                "must be positive",
            ));
        }
        if self.monitor.tick_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "monitor.tick_interval_ms",
                "must be positive",
            ));
        }
        if self.monitor.alert_threshold <= Decimal::ZERO
            || self.monitor.alert_threshold > Decimal::ONE
        {
            return Err(ConfigError::invalid(
                "monitor.alert_threshold",
                "must be in (0, 1]",
            ));
        }
        if let Some(limit) = self.monitor.var_limit {
            if limit <= Decimal::ZERO {
                return Err(ConfigError::invalid("monitor.var_limit", "must be positive"));
            }
        }
        if self.monitor.alert_buffer == 0 {
            return Err(ConfigError::invalid(
                "monitor.alert_buffer",
                "must be positive",
            ));
        }
        if self.audit.enabled && self.audit.buffer_size == 0 {
            return Err(ConfigError::invalid("audit.buffer_size", "must be positive"));
        }
        Ok(())
    }
}
