//! Decision audit trail
//!
//! Stores every sizing decision to Parquet

mod parquet;
mod recorder;

pub use self::parquet::{decision_schema, AuditReader, AuditWriter, DecisionRecord};
pub use recorder::{AuditRecorder, RecorderStats};
