//! Trade signals consumed from the inference pipeline

mod types;

pub use types::{Side, Signal};
