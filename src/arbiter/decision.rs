//! Sizing decision record

use crate::risk::{HistoryStatus, LimitKind, RejectReason, VersionedLimits};
use crate::signal::{Side, Signal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of sizing one signal
///
/// Carries no wall-clock fields, so the same signal evaluated against the
/// same portfolio and limits versions yields an equal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub signal_id: Uuid,
    pub symbol: String,
    pub side: Side,
    /// Fractional Kelly size before limits
    pub requested_fraction: Decimal,
    /// Size after limits, zero when rejected
    pub approved_fraction: Decimal,
    /// Signed quantity at the reference price
    pub approved_quantity: Decimal,
    pub reference_price: Option<Decimal>,
    pub rejection_reason: Option<RejectReason>,
    /// Limits that shrank the size, in check order
    pub adjustments: Vec<LimitKind>,
    pub history: HistoryStatus,
    /// Portfolio version the sizing read
    pub snapshot_version: u64,
    pub limits_version: u64,
    /// Portfolio version produced by applying this decision
    pub applied_version: Option<u64>,
}

impl Decision {
    /// Empty decision for a signal before sizing
    pub(crate) fn pending(signal: &Signal, snapshot_version: u64, limits: &VersionedLimits) -> Self {
        Self {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            side: signal.side,
            requested_fraction: Decimal::ZERO,
            approved_fraction: Decimal::ZERO,
            approved_quantity: Decimal::ZERO,
            reference_price: None,
            rejection_reason: None,
            adjustments: Vec::new(),
            history: HistoryStatus::Complete,
            snapshot_version,
            limits_version: limits.version,
            applied_version: None,
        }
    }

    pub(crate) fn reject(mut self, reason: RejectReason) -> Self {
        self.approved_fraction = Decimal::ZERO;
        self.approved_quantity = Decimal::ZERO;
        self.rejection_reason = Some(reason);
        self
    }

    pub fn is_approved(&self) -> bool {
        self.rejection_reason.is_none() && self.approved_fraction > Decimal::ZERO
    }

    /// Approved size in currency at the reference price
    pub fn approved_notional(&self) -> Decimal {
        self.reference_price
            .map(|p| (self.approved_quantity * p).abs())
            .unwrap_or(Decimal::ZERO)
    }
}
