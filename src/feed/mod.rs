//! Price feed types
//!
//! Ticks are produced by the market-data collaborator and applied to the
//! portfolio through its single writer.

mod types;

pub use types::PriceTick;
