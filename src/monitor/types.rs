//! Risk snapshot and alert types

use crate::risk::RiskError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Freshness of a published risk snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// Computed from the portfolio version it names
    Fresh,
    /// An earlier computation republished because the current one overran
    Stale,
    /// A held symbol lacks a full return window, or a flat book lacks a full
    /// equity window; VaR and correlation absent
    InsufficientHistory,
}

/// Pairwise correlation of held symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// Row and column labels
    pub symbols: Vec<String>,
    /// Row-major values, 1 on the diagonal
    pub values: Vec<Vec<Decimal>>,
}

impl CorrelationMatrix {
    pub fn empty() -> Self {
        Self {
            symbols: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<Decimal> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        self.values.get(i).and_then(|row| row.get(j)).copied()
    }

    /// Largest off-diagonal entry
    pub fn max_pairwise(&self) -> Option<Decimal> {
        self.values
            .iter()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(move |(j, _)| *j != i)
                    .map(|(_, v)| *v)
            })
            .max()
    }
}

/// Periodic portfolio risk measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// When the computation ran
    pub timestamp: DateTime<Utc>,
    /// Portfolio version it was computed from
    pub portfolio_version: u64,
    pub equity: Decimal,
    pub current_drawdown: Decimal,
    /// Historical VaR as a non-negative loss fraction of equity
    pub value_at_risk: Option<Decimal>,
    /// VaR in currency
    pub value_at_risk_amount: Option<Decimal>,
    pub correlation_matrix: Option<CorrelationMatrix>,
    pub leverage: Option<Decimal>,
    pub status: SnapshotStatus,
    /// Milliseconds since computation, non-zero when stale
    pub age_ms: u64,
    /// Monitor computation that produced it
    pub generation: u64,
}

impl RiskSnapshot {
    pub fn is_fresh(&self) -> bool {
        self.status != SnapshotStatus::Stale
    }

    /// Borrow the snapshot, or fail if it is a stale republish
    pub fn require_fresh(&self) -> Result<&Self, RiskError> {
        if self.status == SnapshotStatus::Stale {
            return Err(RiskError::StaleSnapshot {
                age_ms: self.age_ms,
            });
        }
        Ok(self)
    }

    /// Republish as stale, aged from the original computation
    pub fn into_stale(mut self, now: DateTime<Utc>) -> Self {
        let age = (now - self.timestamp).num_milliseconds().max(1);
        self.status = SnapshotStatus::Stale;
        self.age_ms = age as u64;
        self
    }
}

/// Which risk measure breached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Drawdown,
    ValueAtRisk,
    Leverage,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Drawdown => "drawdown",
            AlertKind::ValueAtRisk => "value_at_risk",
            AlertKind::Leverage => "leverage",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted once when a risk measure enters breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: AlertKind,
    pub value: Decimal,
    pub threshold: Decimal,
    pub portfolio_version: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn snapshot() -> RiskSnapshot {
        RiskSnapshot {
            timestamp: Utc::now(),
            portfolio_version: 4,
            equity: dec!(100000),
            current_drawdown: dec!(0.01),
            value_at_risk: Some(dec!(0.02)),
            value_at_risk_amount: Some(dec!(2000)),
            correlation_matrix: None,
            leverage: Some(dec!(0.5)),
            status: SnapshotStatus::Fresh,
            age_ms: 0,
            generation: 1,
        }
    }

    #[test]
    fn test_into_stale_has_age() {
        let fresh = snapshot();
        assert!(fresh.require_fresh().is_ok());

        let stale = fresh.clone().into_stale(fresh.timestamp + Duration::milliseconds(250));
        assert_eq!(stale.status, SnapshotStatus::Stale);
        assert_eq!(stale.age_ms, 250);
        assert!(matches!(
            stale.require_fresh(),
            Err(RiskError::StaleSnapshot { age_ms: 250 })
        ));
    }

    #[test]
    fn test_stale_age_never_zero() {
        let fresh = snapshot();
        let stale = fresh.clone().into_stale(fresh.timestamp);
        assert_eq!(stale.age_ms, 1);
    }

    #[test]
    fn test_matrix_lookup() {
        let matrix = CorrelationMatrix {
            symbols: vec!["AAPL".into(), "MSFT".into()],
            values: vec![vec![dec!(1), dec!(0.8)], vec![dec!(0.8), dec!(1)]],
        };
        assert_eq!(matrix.get("AAPL", "MSFT"), Some(dec!(0.8)));
        assert_eq!(matrix.get("AAPL", "GOOG"), None);
        assert_eq!(matrix.max_pairwise(), Some(dec!(0.8)));
        assert_eq!(CorrelationMatrix::empty().max_pairwise(), None);
    }
}
