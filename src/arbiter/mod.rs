//! Constraint arbiter
//!
//! Single entry point for sizing a signal: reads one portfolio snapshot and
//! one limits version, runs the Kelly sizer then the limit checks, and hands
//! approved decisions to the portfolio writer.

mod decision;

pub use decision::Decision;

use crate::portfolio::{ApplyOutcome, ApplyRequest, PortfolioHandle, PortfolioSnapshot};
use crate::risk::{
    volatility_factor, KellySizer, LimitsStore, PositionSizer, RejectReason, RiskError,
    RiskLimitEngine, VersionedLimits,
};
use crate::signal::Signal;
use crate::telemetry::{self, LatencyMetric};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

/// Sizes signals against the live portfolio and active limits
#[derive(Clone)]
pub struct ConstraintArbiter {
    portfolio: PortfolioHandle,
    limits: Arc<LimitsStore>,
    engine: RiskLimitEngine,
}

impl ConstraintArbiter {
    pub fn new(portfolio: PortfolioHandle, limits: Arc<LimitsStore>) -> Self {
        Self {
            portfolio,
            limits,
            engine: RiskLimitEngine::new(),
        }
    }

    pub fn portfolio(&self) -> &PortfolioHandle {
        &self.portfolio
    }

    pub fn limits(&self) -> &Arc<LimitsStore> {
        &self.limits
    }

    /// Size a signal against a fixed snapshot and limits version
    ///
    /// Pure: no portfolio mutation, no clock reads.
    pub fn decide(
        &self,
        signal: &Signal,
        snapshot: &PortfolioSnapshot,
        limits: &VersionedLimits,
    ) -> Result<Decision, RiskError> {
        let params = &limits.limits;
        let decision = Decision::pending(signal, snapshot.version, limits);

        let sizer = KellySizer::from_limits(params);
        let realized = snapshot.realized_volatility(&signal.symbol, params.var_window);
        let factor = volatility_factor(params.baseline_volatility, realized, params.min_volatility);
        let raw = sizer.size(signal, snapshot.equity, factor)?;

        let mut decision = Decision {
            requested_fraction: raw,
            ..decision
        };
        if raw <= Decimal::ZERO {
            return Ok(decision.reject(RejectReason::NoEdge));
        }

        let Some(price) = snapshot.price(&signal.symbol) else {
            return Ok(decision.reject(RejectReason::NoPrice));
        };
        decision.reference_price = Some(price);

        let outcome = self
            .engine
            .clip(raw, &signal.symbol, signal.side, snapshot, params);
        decision.history = outcome.history;
        decision.adjustments = outcome.adjustments.clone();

        if let Some(reason) = outcome.rejection() {
            return Ok(decision.reject(reason));
        }

        decision.approved_fraction = outcome.approved_fraction;
        decision.approved_quantity = snapshot
            .order_quantity(&signal.symbol, signal.side, outcome.approved_fraction)
            .unwrap_or(Decimal::ZERO);
        Ok(decision)
    }

    /// Size a signal and apply it if approved
    ///
    /// Fails only on an invalid signal or an unavailable portfolio writer;
    /// every other outcome is a [`Decision`].
    pub async fn evaluate(&self, signal: &Signal) -> Result<Decision, RiskError> {
        let started = Instant::now();
        let snapshot = self.portfolio.snapshot();
        let limits = self.limits.current();

        let mut decision = match self.decide(signal, &snapshot, &limits) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(signal_id = %signal.id, symbol = %signal.symbol, error = %e, "Signal rejected");
                return Err(e);
            }
        };

        if decision.is_approved() {
            let outcome = self
                .portfolio
                .apply(ApplyRequest {
                    signal_id: signal.id,
                    symbol: signal.symbol.clone(),
                    side: signal.side,
                    raw_fraction: decision.requested_fraction,
                    approved_fraction: decision.approved_fraction,
                    evaluated_version: snapshot.version,
                    limits: limits.clone(),
                })
                .await?;
            decision = settle(decision, outcome);
        }

        telemetry::record_decision(decision.rejection_reason);
        telemetry::record_latency(LatencyMetric::Evaluation, started.elapsed());
        tracing::debug!(
            signal_id = %decision.signal_id,
            symbol = %decision.symbol,
            requested = %decision.requested_fraction,
            approved = %decision.approved_fraction,
            reason = ?decision.rejection_reason,
            snapshot_version = decision.snapshot_version,
            "Signal evaluated"
        );

        Ok(decision)
    }
}

/// Fold the writer's apply result back into the decision
fn settle(mut decision: Decision, outcome: ApplyOutcome) -> Decision {
    match outcome {
        ApplyOutcome::Applied {
            version,
            quantity,
            price,
            approved_fraction,
            revalidated_against,
        } => {
            if let Some(v) = revalidated_against {
                decision.snapshot_version = v;
                decision.approved_fraction = approved_fraction;
            }
            decision.approved_quantity = quantity;
            decision.reference_price = Some(price);
            decision.applied_version = Some(version);
            decision
        }
        ApplyOutcome::Rejected {
            reason,
            revalidated_against,
        } => {
            if let Some(v) = revalidated_against {
                decision.snapshot_version = v;
            }
            decision.reject(reason)
        }
        ApplyOutcome::Duplicate => decision.reject(RejectReason::Duplicate),
    }
}
