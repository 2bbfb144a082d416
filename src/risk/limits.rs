//! Risk limits and their versioned store

use crate::config::{Config, ConfigError};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Portfolio-wide risk limits
///
/// Immutable once loaded. A reload produces a new [`VersionedLimits`]
/// rather than editing this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskLimits {
    /// Maximum single order as a fraction of equity
    pub max_position_size: Decimal,
    /// Multiplier applied to full Kelly (e.g., 0.5 for half Kelly)
    pub kelly_fraction: Decimal,
    /// Maximum gross exposure over equity
    pub max_leverage: Decimal,
    /// Drawdown from peak at which new exposure is gated
    pub max_drawdown: Decimal,
    /// Confidence level for historical VaR (e.g., 0.95)
    pub var_confidence: Decimal,
    /// Lookback length for VaR, volatility and correlation
    pub var_window: usize,
    /// Correlation at which new exposure starts being scaled down
    pub correlation_threshold: Decimal,
    /// Per-period return volatility at which size is not scaled
    #[serde(default = "default_baseline_volatility")]
    pub baseline_volatility: Decimal,
    /// Floor for realized volatility in the scaling denominator
    #[serde(default = "default_min_volatility")]
    pub min_volatility: Decimal,
    /// Reject new exposure when correlation cannot be measured
    #[serde(default)]
    pub require_correlation_history: bool,
}

fn default_baseline_volatility() -> Decimal {
    dec!(0.02)
}
fn default_min_volatility() -> Decimal {
    dec!(0.0001)
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: dec!(0.10),
            kelly_fraction: dec!(0.5),
            max_leverage: dec!(2.0),
            max_drawdown: dec!(0.20),
            var_confidence: dec!(0.95),
            var_window: 250,
            correlation_threshold: dec!(0.7),
            baseline_volatility: default_baseline_volatility(),
            min_volatility: default_min_volatility(),
            require_correlation_history: false,
        }
    }
}

impl RiskLimits {
    /// Reject out-of-range values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = Decimal::ZERO;
        let one = Decimal::ONE;

        if self.max_position_size <= zero || self.max_position_size > one {
            return Err(ConfigError::invalid(
                "limits.max_position_size",
                "must be in (0, 1]",
            ));
        }
        if self.kelly_fraction < zero || self.kelly_fraction > one {
            return Err(ConfigError::invalid(
                "limits.kelly_fraction",
                "must be in [0, 1]",
            ));
        }
        if self.max_leverage <= zero {
            return Err(ConfigError::invalid("limits.max_leverage", "must be positive"));
        }
        if self.max_drawdown <= zero || self.max_drawdown > one {
            return Err(ConfigError::invalid("limits.max_drawdown", "must be in (0, 1]"));
        }
        if self.var_confidence <= zero || self.var_confidence >= one {
            return Err(ConfigError::invalid(
                "limits.var_confidence",
                "must be in (0, 1)",
            ));
        }
        if self.var_window < 2 {
            return Err(ConfigError::invalid("limits.var_window", "must be at least 2"));
        }
        if self.correlation_threshold < zero || self.correlation_threshold >= one {
            return Err(ConfigError::invalid(
                "limits.correlation_threshold",
                "must be in [0, 1)",
            ));
        }
        if self.baseline_volatility <= zero {
            return Err(ConfigError::invalid(
                "limits.baseline_volatility",
                "must be positive",
            ));
        }
        if self.min_volatility <= zero {
            return Err(ConfigError::invalid(
                "limits.min_volatility",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// A limit set tagged with its configuration version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionedLimits {
    pub version: u64,
    pub limits: RiskLimits,
    pub loaded_at: DateTime<Utc>,
}

/// Holds the active limit set; reloads swap in a whole new version
///
/// Bound to the running portfolio's `history_capacity`: a limit set whose
/// `var_window` could never fill is rejected.
pub struct LimitsStore {
    current: ArcSwap<VersionedLimits>,
    history_capacity: usize,
}

impl LimitsStore {
    /// Validate and install the initial limits as version 1
    pub fn new(limits: RiskLimits, history_capacity: usize) -> Result<Self, ConfigError> {
        validate_window(&limits, history_capacity)?;
        limits.validate()?;
        Ok(Self {
            history_capacity,
            current: ArcSwap::from_pointee(VersionedLimits {
                version: 1,
                limits,
                loaded_at: Utc::now(),
            }),
        })
    }

    /// The active version; holders keep it for the whole evaluation
    pub fn current(&self) -> Arc<VersionedLimits> {
        self.current.load_full()
    }

    /// Validate and atomically replace the active limits, returning the new version
    pub fn reload(&self, limits: RiskLimits) -> Result<u64, ConfigError> {
        limits.validate()?;
        validate_window(&limits, self.history_capacity)?;
        let loaded_at = Utc::now();
        self.current.rcu(|current| {
            Arc::new(VersionedLimits {
                version: current.version + 1,
                limits: limits.clone(),
                loaded_at,
            })
        });
        let version = self.current.load().version;
        tracing::info!(version, "Risk limits reloaded");
        Ok(version)
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Reload the `[limits]` section of a config file
    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<u64, ConfigError> {
        let config = Config::load(path)?;
        self.reload(config.limits)
    }
}

fn validate_window(limits: &RiskLimits, history_capacity: usize) -> Result<(), ConfigError> {
    if limits.var_window > history_capacity {
        return Err(ConfigError::invalid(
            "limits.var_window",
            format!(
                "must not exceed the portfolio history capacity ({})",
                history_capacity
            ),
        ));
    }
    Ok(())
}
