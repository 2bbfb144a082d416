//! Kelly criterion position sizing

use super::{RiskError, RiskLimits};
use crate::signal::Signal;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Trait for position sizing implementations
pub trait PositionSizer: Send + Sync {
    /// Raw target size as a fraction of equity, before hard caps
    fn size(
        &self,
        signal: &Signal,
        equity: Decimal,
        volatility_factor: Decimal,
    ) -> Result<Decimal, RiskError>;

    /// Get the sizing mode name
    fn mode_name(&self) -> &'static str;
}

/// Fractional Kelly sizer for win-probability / payoff-ratio signals
#[derive(Debug, Clone)]
pub struct KellySizer {
    /// Kelly fraction (e.g., 0.5 for half Kelly)
    pub fraction: Decimal,
}

impl KellySizer {
    /// Create a new Kelly sizer
    pub fn new(fraction: Decimal) -> Self {
        Self { fraction }
    }

    /// Sizer for the given limit set
    pub fn from_limits(limits: &RiskLimits) -> Self {
        Self::new(limits.kelly_fraction)
    }

    /// Full Kelly fraction f* = p - (1 - p) / b
    ///
    /// May be negative; callers clamp. Fails when p is outside [0, 1] or
    /// b is not positive.
    pub fn full_kelly(probability: Decimal, payoff_ratio: Decimal) -> Result<Decimal, RiskError> {
        if probability < Decimal::ZERO || probability > Decimal::ONE {
            return Err(RiskError::InvalidSignal(format!(
                "probability {} outside [0, 1]",
                probability
            )));
        }
        if payoff_ratio <= Decimal::ZERO {
            return Err(RiskError::InvalidSignal(format!(
                "payoff ratio {} must be positive",
                payoff_ratio
            )));
        }

        Ok(probability - (Decimal::ONE - probability) / payoff_ratio)
    }

    /// Size in currency rather than as a fraction
    pub fn size_notional(
        &self,
        signal: &Signal,
        equity: Decimal,
        volatility_factor: Decimal,
    ) -> Result<Decimal, RiskError> {
        Ok(self.size(signal, equity, volatility_factor)? * equity)
    }
}

impl Default for KellySizer {
    fn default() -> Self {
        Self::new(dec!(0.5))
    }
}

impl PositionSizer for KellySizer {
    fn size(
        &self,
        signal: &Signal,
        equity: Decimal,
        volatility_factor: Decimal,
    ) -> Result<Decimal, RiskError> {
        let kelly = Self::full_kelly(signal.probability, signal.payoff_ratio)?;

        // Never bet against a negative edge, and nothing to size against without equity
        if kelly <= Decimal::ZERO || equity <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let factor = volatility_factor.clamp(Decimal::ZERO, Decimal::ONE);
        Ok((kelly * self.fraction * factor).max(Decimal::ZERO))
    }

    fn mode_name(&self) -> &'static str {
        "kelly"
    }
}

/// baseline / max(realized, epsilon), clamped to (0, 1]
///
/// Unknown realized volatility leaves size unscaled.
pub fn volatility_factor(
    baseline: Decimal,
    realized: Option<Decimal>,
    epsilon: Decimal,
) -> Decimal {
    match realized {
        None => Decimal::ONE,
        Some(realized) => {
            let denom = realized.max(epsilon);
            if denom <= Decimal::ZERO {
                return Decimal::ONE;
            }
            (baseline / denom).min(Decimal::ONE)
        }
    }
}
