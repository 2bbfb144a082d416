//! Portfolio state
//!
//! Positions, cash and the equity curve, mutated by one writer task and read
//! through versioned immutable snapshots.

mod position;
mod state;
mod writer;

pub use position::Position;
pub use state::{EquityPoint, PortfolioSnapshot, PortfolioState, SymbolSeries};
pub use writer::{ApplyOutcome, ApplyRequest, PortfolioHandle, PortfolioWriter};
