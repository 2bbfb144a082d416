//! Statistical risk models

use super::{CorrelationMatrix, RiskSnapshot, SnapshotStatus};
use crate::portfolio::PortfolioSnapshot;
use crate::risk::{stats, RiskLimits};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Computes a risk snapshot from one portfolio version
///
/// Runs on a blocking thread, so implementations may be CPU heavy.
pub trait RiskModel: Send + Sync + 'static {
    fn compute(&self, snapshot: &PortfolioSnapshot, limits: &RiskLimits) -> RiskSnapshot;

    /// Model name for logs
    fn name(&self) -> &'static str;
}

/// Historical simulation over the current holdings
///
/// Portfolio returns are the exposure-weighted sum of each held symbol's
/// last `var_window` returns. VaR is the (1 - confidence) percentile loss of
/// that series.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalRiskModel;

impl HistoricalRiskModel {
    pub fn new() -> Self {
        Self
    }
}

impl RiskModel for HistoricalRiskModel {
    fn compute(&self, snapshot: &PortfolioSnapshot, limits: &RiskLimits) -> RiskSnapshot {
        let mut risk = RiskSnapshot {
            timestamp: Utc::now(),
            portfolio_version: snapshot.version,
            equity: snapshot.equity,
            current_drawdown: snapshot.drawdown(),
            value_at_risk: None,
            value_at_risk_amount: None,
            correlation_matrix: None,
            leverage: snapshot.leverage(),
            status: SnapshotStatus::Fresh,
            age_ms: 0,
            generation: 0,
        };

        let held: Vec<(&str, Decimal)> = snapshot
            .positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| (p.symbol.as_str(), p.market_value()))
            .collect();

        if held.is_empty() {
            // Flat books still need a full window of equity points before VaR is reported
            if snapshot.equity_history.len() < limits.var_window {
                risk.status = SnapshotStatus::InsufficientHistory;
                return risk;
            }
            risk.value_at_risk = Some(Decimal::ZERO);
            risk.value_at_risk_amount = Some(Decimal::ZERO);
            risk.correlation_matrix = Some(CorrelationMatrix::empty());
            return risk;
        }

        let window = limits.var_window;
        let mut series = Vec::with_capacity(held.len());
        for (symbol, _) in &held {
            match snapshot.returns_tail(symbol, window) {
                Ok(returns) => series.push(returns),
                Err(e) => {
                    tracing::debug!(error = %e, "Risk metrics need more history");
                    risk.status = SnapshotStatus::InsufficientHistory;
                    return risk;
                }
            }
        }

        risk.correlation_matrix = Some(correlation_matrix(&held, &series));

        let Some(equity) = snapshot.equity.to_f64().filter(|e| *e > 0.0) else {
            tracing::warn!(equity = %snapshot.equity, "Non-positive equity, VaR undefined");
            return risk;
        };

        let weights: Vec<f64> = held
            .iter()
            .map(|(_, value)| value.to_f64().unwrap_or(0.0) / equity)
            .collect();
        let portfolio: Vec<f64> = (0..window)
            .map(|t| {
                weights
                    .iter()
                    .zip(&series)
                    .map(|(w, returns)| w * returns[t])
                    .sum()
            })
            .collect();

        let confidence = limits.var_confidence.to_f64().unwrap_or(0.95);
        if let Some(var) = stats::historical_var(&portfolio, confidence).and_then(stats::to_decimal) {
            risk.value_at_risk = Some(var);
            risk.value_at_risk_amount = Some((var * snapshot.equity).round_dp(2));
        }

        risk
    }

    fn name(&self) -> &'static str {
        "historical"
    }
}

fn correlation_matrix(held: &[(&str, Decimal)], series: &[Vec<f64>]) -> CorrelationMatrix {
    let n = held.len();
    let mut values = vec![vec![Decimal::ZERO; n]; n];

    for i in 0..n {
        values[i][i] = Decimal::ONE;
        for j in (i + 1)..n {
            // Zero-variance pairs have no defined correlation; report 0
            let corr = stats::pearson(&series[i], &series[j])
                .and_then(stats::to_decimal)
                .unwrap_or(Decimal::ZERO);
            values[i][j] = corr;
            values[j][i] = corr;
        }
    }

    CorrelationMatrix {
        symbols: held.iter().map(|(s, _)| s.to_string()).collect(),
        values,
    }
}
