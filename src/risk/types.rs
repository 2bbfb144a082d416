//! Risk management types

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A configured risk limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Drawdown from peak equity gates new exposure
    MaxDrawdown,
    /// Single order size as a fraction of equity
    MaxPositionSize,
    /// Gross exposure over equity
    MaxLeverage,
    /// Concentration in correlated holdings
    Correlation,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::MaxDrawdown => "max_drawdown",
            LimitKind::MaxPositionSize => "max_position_size",
            LimitKind::MaxLeverage => "max_leverage",
            LimitKind::Correlation => "correlation_threshold",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a signal ended with a zero approved size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "limit")]
pub enum RejectReason {
    /// Kelly fraction was not positive
    NoEdge,
    /// No mark price known for the symbol
    NoPrice,
    /// Correlation history was required but missing
    InsufficientHistory,
    /// A configured limit left no room
    LimitBreach(LimitKind),
    /// The signal was already applied
    Duplicate,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::NoEdge => "no_edge",
            RejectReason::NoPrice => "no_price",
            RejectReason::InsufficientHistory => "insufficient_history",
            RejectReason::LimitBreach(kind) => kind.as_str(),
            RejectReason::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::LimitBreach(kind) => write!(f, "limit_breach:{}", kind),
            other => f.write_str(other.label()),
        }
    }
}

/// Risk management errors
#[derive(Debug, Error)]
pub enum RiskError {
    /// Signal cannot be evaluated at all
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),
    /// Not enough return observations for a statistic
    #[error("Insufficient history for {symbol}: {available} of {required} observations")]
    InsufficientHistory {
        symbol: String,
        available: usize,
        required: usize,
    },
    /// Risk snapshot is a reused earlier computation
    #[error("Risk snapshot is stale ({age_ms} ms old)")]
    StaleSnapshot { age_ms: u64 },
    /// Risk computation overran its tick budget
    #[error("Risk computation exceeded {budget_ms} ms")]
    ComputationTimeout { budget_ms: u64 },
    /// Price tick failed sanity checks
    #[error("Invalid price for {symbol}: {reason}")]
    InvalidPrice { symbol: String, reason: String },
    /// Portfolio writer task has shut down
    #[error("Portfolio writer is unavailable")]
    PortfolioUnavailable,
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RiskError {
    /// Hard failures are propagated to the caller; everything else degrades
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            RiskError::InvalidSignal(_) | RiskError::Config(_) | RiskError::PortfolioUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_display() {
        assert_eq!(RejectReason::NoEdge.to_string(), "no_edge");
        assert_eq!(
            RejectReason::LimitBreach(LimitKind::MaxLeverage).to_string(),
            "limit_breach:max_leverage"
        );
    }

    #[test]
    fn test_reject_reason_serde() {
        let json = serde_json::to_string(&RejectReason::LimitBreach(LimitKind::MaxDrawdown)).unwrap();
        assert_eq!(json, r#"{"kind":"limit_breach","limit":"max_drawdown"}"#);

        let back: RejectReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RejectReason::LimitBreach(LimitKind::MaxDrawdown));
    }

    #[test]
    fn test_hard_failures() {
        assert!(RiskError::InvalidSignal("p".into()).is_hard_failure());
        assert!(RiskError::PortfolioUnavailable.is_hard_failure());
        assert!(!RiskError::StaleSnapshot { age_ms: 5 }.is_hard_failure());
        assert!(!RiskError::ComputationTimeout { budget_ms: 5 }.is_hard_failure());
        assert!(!RiskError::InvalidPrice {
            symbol: "AAPL".into(),
            reason: "non-positive".into()
        }
        .is_hard_failure());
    }
}
