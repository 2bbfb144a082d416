//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price observation from the market-data collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Instrument symbol (e.g., "AAPL")
    pub symbol: String,
    /// Last traded or mark price
    pub price: Decimal,
    /// Observation timestamp, receipt time when absent
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    /// Create a tick stamped now
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
        }
    }
}
