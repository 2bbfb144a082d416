//! Risk management module
//!
//! Kelly sizing, portfolio limits, and return statistics

mod engine;
mod kelly;
mod limits;
pub mod stats;
mod types;

pub use engine::{correlation_scale, ClipOutcome, HistoryStatus, RiskLimitEngine};
pub use kelly::{volatility_factor, KellySizer, PositionSizer};
pub use limits::{LimitsStore, RiskLimits, VersionedLimits};
pub use types::{LimitKind, RejectReason, RiskError};
