//! Portfolio limit checks applied to a raw Kelly size

use super::{stats, LimitKind, RejectReason, RiskLimits};
use crate::portfolio::PortfolioSnapshot;
use crate::signal::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether every return series a check wanted was available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    #[default]
    Complete,
    /// At least one correlation pair was skipped for lack of returns
    Insufficient,
}

/// Result of running the ordered limit checks
#[derive(Debug, Clone, PartialEq)]
pub struct ClipOutcome {
    /// Approved size as a fraction of equity, never above the raw size
    pub approved_fraction: Decimal,
    /// First check that shrank the size
    pub reason: Option<RejectReason>,
    /// Every limit that shrank the size, in check order
    pub adjustments: Vec<LimitKind>,
    /// Largest same-direction correlation against held symbols
    pub max_correlation: Option<Decimal>,
    pub history: HistoryStatus,
    /// Part of the approved size that offsets existing opposite exposure
    pub reducing_fraction: Decimal,
    zeroed_by: Option<RejectReason>,
}

impl ClipOutcome {
    fn unchanged(raw: Decimal) -> Self {
        Self {
            approved_fraction: raw,
            reason: None,
            adjustments: Vec::new(),
            max_correlation: None,
            history: HistoryStatus::Complete,
            reducing_fraction: Decimal::ZERO,
            zeroed_by: None,
        }
    }

    /// Why nothing was approved, or None if something was
    pub fn rejection(&self) -> Option<RejectReason> {
        if self.approved_fraction > Decimal::ZERO {
            return None;
        }
        Some(
            self.zeroed_by
                .or(self.reason)
                .unwrap_or(RejectReason::NoEdge),
        )
    }

    fn record(&mut self, reason: RejectReason, before: Decimal, after: Decimal) {
        if after >= before {
            return;
        }
        if let RejectReason::LimitBreach(kind) = reason {
            self.adjustments.push(kind);
        }
        if self.reason.is_none() {
            self.reason = Some(reason);
        }
        if after.is_zero() && self.zeroed_by.is_none() {
            self.zeroed_by = Some(reason);
        }
    }
}

/// Scale applied to new exposure for a given maximum correlation
///
/// 1 below the threshold, falling linearly to 0 at perfect correlation.
pub fn correlation_scale(max_correlation: Decimal, threshold: Decimal) -> Decimal {
    if max_correlation < threshold || threshold >= Decimal::ONE {
        return Decimal::ONE;
    }
    let excess = ((max_correlation - threshold) / (Decimal::ONE - threshold))
        .clamp(Decimal::ZERO, Decimal::ONE);
    Decimal::ONE - excess
}

/// Stateless checker for drawdown, position, leverage and correlation limits
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskLimitEngine;

impl RiskLimitEngine {
    pub fn new() -> Self {
        Self
    }

    /// Clip a raw fraction against one snapshot and one limit set
    ///
    /// The order is split into a reducing part, capped at the opposite-side
    /// exposure already held, and a new-exposure part. The position cap
    /// bounds the whole order; the drawdown, leverage and correlation
    /// checks only restrict new exposure.
    pub fn clip(
        &self,
        raw_fraction: Decimal,
        symbol: &str,
        side: Side,
        snapshot: &PortfolioSnapshot,
        limits: &RiskLimits,
    ) -> ClipOutcome {
        let raw = raw_fraction.max(Decimal::ZERO);
        let mut out = ClipOutcome::unchanged(raw);
        if raw.is_zero() {
            return out;
        }

        let equity = snapshot.equity;
        if equity <= Decimal::ZERO {
            out.approved_fraction = Decimal::ZERO;
            out.record(RejectReason::LimitBreach(LimitKind::MaxLeverage), raw, Decimal::ZERO);
            return out;
        }

        let directional = snapshot.exposure(symbol) * side.sign();
        let reducible = if directional < Decimal::ZERO {
            -directional / equity
        } else {
            Decimal::ZERO
        };

        let mut approved = raw;

        // 1. Drawdown gate: only reducing exposure passes
        if snapshot.drawdown() >= limits.max_drawdown {
            let gated = approved.min(reducible);
            out.record(RejectReason::LimitBreach(LimitKind::MaxDrawdown), approved, gated);
            approved = gated;
        }

        // 2. Position cap on the whole order
        let capped = approved.min(limits.max_position_size);
        out.record(
            RejectReason::LimitBreach(LimitKind::MaxPositionSize),
            approved,
            capped,
        );
        approved = capped;

        let reducing = approved.min(reducible);
        let mut fresh = approved - reducing;

        // 3. Leverage budget left after the reducing part
        if fresh > Decimal::ZERO {
            let leverage_after_reduce = snapshot.gross_exposure() / equity - reducing;
            let residual = limits.max_leverage - leverage_after_reduce;
            let allowed = if residual <= Decimal::ZERO {
                Decimal::ZERO
            } else {
                fresh.min(residual)
            };
            out.record(
                RejectReason::LimitBreach(LimitKind::MaxLeverage),
                reducing + fresh,
                reducing + allowed,
            );
            fresh = allowed;
        }

        // 4. Correlation with what is already held
        if fresh > Decimal::ZERO {
            let (max_corr, complete) = max_directional_correlation(symbol, side, snapshot, limits);
            out.max_correlation = max_corr;
            if !complete {
                out.history = HistoryStatus::Insufficient;
            }

            let allowed = if !complete && limits.require_correlation_history {
                out.record(RejectReason::InsufficientHistory, reducing + fresh, reducing);
                Decimal::ZERO
            } else {
                let scale = max_corr
                    .map(|c| correlation_scale(c, limits.correlation_threshold))
                    .unwrap_or(Decimal::ONE);
                let scaled = fresh * scale;
                out.record(
                    RejectReason::LimitBreach(LimitKind::Correlation),
                    reducing + fresh,
                    reducing + scaled,
                );
                scaled
            };
            fresh = allowed;
        }

        out.reducing_fraction = reducing;
        out.approved_fraction = (reducing + fresh).min(raw);
        out
    }
}

/// Max correlation of the candidate's new exposure with held positions
///
/// Correlations are signed by both directions, so a long candidate that
/// moves with an existing short counts as diversifying. Returns false in the
/// second slot when any pair lacked a full window.
fn max_directional_correlation(
    symbol: &str,
    side: Side,
    snapshot: &PortfolioSnapshot,
    limits: &RiskLimits,
) -> (Option<Decimal>, bool) {
    let window = limits.var_window;
    let candidate = snapshot.returns_tail(symbol, window).ok();

    let mut complete = true;
    let mut max_corr: Option<f64> = None;

    for (held, position) in snapshot
        .positions
        .iter()
        .filter(|(s, p)| s.as_str() != symbol && !p.is_flat())
    {
        let (Some(a), Ok(b)) = (candidate.as_ref(), snapshot.returns_tail(held, window)) else {
            tracing::debug!(symbol, held = %held, window, "Skipping correlation pair without history");
            complete = false;
            continue;
        };
        let Some(corr) = stats::pearson(a, &b) else {
            continue;
        };

        let held_sign = if position.quantity.is_sign_negative() { -1.0 } else { 1.0 };
        let side_sign = match side {
            Side::Long => 1.0,
            Side::Short => -1.0,
        };
        let directional = corr * held_sign * side_sign;
        max_corr = Some(max_corr.map_or(directional, |m: f64| m.max(directional)));
    }

    (max_corr.and_then(stats::to_decimal), complete)
}
