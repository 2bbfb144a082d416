//! kelly-gate: Kelly position sizing gated by portfolio risk limits
//!
//! This library provides the core components for:
//! - Kelly criterion sizing with volatility scaling
//! - Drawdown, position, leverage and correlation limit checks
//! - Single-writer portfolio state with versioned snapshots
//! - Constraint arbitration from signal to applied decision
//! - Background VaR, drawdown and correlation monitoring with alerts
//! - Return history seeding and a Parquet decision audit trail

pub mod arbiter;
pub mod audit;
pub mod cli;
pub mod config;
pub mod feed;
pub mod history;
pub mod monitor;
pub mod portfolio;
pub mod risk;
pub mod signal;
pub mod telemetry;
