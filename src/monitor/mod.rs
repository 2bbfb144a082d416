//! Risk monitor
//!
//! Recomputes drawdown, historical VaR and the held-symbol correlation matrix
//! on a fixed tick, publishes [`RiskSnapshot`]s on a watch channel and emits
//! [`RiskAlert`]s once per breach episode. Overrunning computations are left
//! to finish in the background while the previous snapshot is republished as
//! stale.

mod alerts;
mod model;
mod runner;
mod types;

pub use alerts::AlertTracker;
pub use model::{HistoricalRiskModel, RiskModel};
pub use runner::{MonitorHandle, RiskMonitor};
pub use types::{AlertKind, CorrelationMatrix, RiskAlert, RiskSnapshot, SnapshotStatus};
