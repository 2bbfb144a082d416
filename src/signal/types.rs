//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trade direction of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy / increase long exposure
    #[default]
    Long,
    /// Sell / increase short exposure
    Short,
}

impl Side {
    /// Sign applied to quantities traded on this side
    pub fn sign(self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// A trade signal produced by the inference pipeline
///
/// Consumed once by the arbiter. `probability` is the estimated win
/// probability and `payoff_ratio` the average win over the average loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Instrument symbol
    pub symbol: String,
    /// Trade direction
    #[serde(default)]
    pub side: Side,
    /// Estimated win probability, expected in [0, 1]
    pub probability: Decimal,
    /// Average win / average loss, expected > 0
    pub payoff_ratio: Decimal,
    /// Signal generation timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new long signal stamped now
    pub fn new(symbol: impl Into<String>, probability: Decimal, payoff_ratio: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side: Side::Long,
            probability,
            payoff_ratio,
            timestamp: Utc::now(),
        }
    }

    /// Set the trade direction
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }
}
