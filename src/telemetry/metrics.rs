//! Prometheus metrics

use crate::risk::RejectReason;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Signal evaluation, sizing through apply
    Evaluation,
    /// One risk monitor recomputation
    RiskComputation,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Drawdown from peak as a fraction
    Drawdown,
    /// Gross exposure over equity
    Leverage,
    /// Historical VaR as a loss fraction
    ValueAtRisk,
    /// Latest published portfolio version
    PortfolioVersion,
    /// Open position count
    OpenPositions,
    /// Active risk limits version
    LimitsVersion,
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::Evaluation => "kelly_gate_evaluation_latency_ms",
            LatencyMetric::RiskComputation => "kelly_gate_risk_computation_latency_ms",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Equity => "kelly_gate_equity",
            GaugeMetric::Drawdown => "kelly_gate_drawdown",
            GaugeMetric::Leverage => "kelly_gate_leverage",
            GaugeMetric::ValueAtRisk => "kelly_gate_value_at_risk",
            GaugeMetric::PortfolioVersion => "kelly_gate_portfolio_version",
            GaugeMetric::OpenPositions => "kelly_gate_open_positions",
            GaugeMetric::LimitsVersion => "kelly_gate_limits_version",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Set a gauge from a decimal, skipping values with no f64 form
pub fn set_decimal_gauge(metric: GaugeMetric, value: Decimal) {
    if let Some(v) = value.to_f64() {
        set_gauge(metric, v);
    }
}

/// Count a decision by outcome and rejection reason
pub fn record_decision(rejection: Option<RejectReason>) {
    match rejection {
        None => metrics::counter!("kelly_gate_decisions_total", "outcome" => "approved").increment(1),
        Some(reason) => metrics::counter!(
            "kelly_gate_decisions_total",
            "outcome" => "rejected",
            "reason" => reason.label()
        )
        .increment(1),
    }
}

/// Count a price tick dropped by sanity checks
pub fn record_invalid_tick() {
    metrics::counter!("kelly_gate_invalid_ticks_total").increment(1);
}

/// Count a price move beyond the sanity bound
pub fn record_price_gap() {
    metrics::counter!("kelly_gate_price_gaps_total").increment(1);
}

/// Count an emitted risk alert
pub fn record_alert(kind: &'static str) {
    metrics::counter!("kelly_gate_alerts_total", "kind" => kind).increment(1);
}

/// Count a risk snapshot published as stale
pub fn record_stale_snapshot() {
    metrics::counter!("kelly_gate_stale_snapshots_total").increment(1);
}
