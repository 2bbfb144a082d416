//! Parquet storage for decision records

use crate::arbiter::Decision;
use crate::risk::{HistoryStatus, LimitKind, RejectReason};
use crate::signal::Side;
use arrow::array::{Array, ArrayRef, StringArray, TimestampMicrosecondArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A decision with the time it was recorded
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRecord {
    pub recorded_at: DateTime<Utc>,
    pub decision: Decision,
}

/// Decision schema; decimals are stored as strings to keep precision
pub fn decision_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "recorded_at",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("signal_id", DataType::Utf8, false),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("side", DataType::Utf8, false),
        Field::new("requested_fraction", DataType::Utf8, false),
        Field::new("approved_fraction", DataType::Utf8, false),
        Field::new("approved_quantity", DataType::Utf8, false),
        Field::new("reference_price", DataType::Utf8, true),
        Field::new("rejection_reason", DataType::Utf8, true),
        Field::new("adjustments", DataType::Utf8, false),
        Field::new("history", DataType::Utf8, false),
        Field::new("snapshot_version", DataType::UInt64, false),
        Field::new("limits_version", DataType::UInt64, false),
        Field::new("applied_version", DataType::UInt64, true),
    ])
}

struct OpenFile {
    path: PathBuf,
    started: DateTime<Utc>,
    writer: ArrowWriter<File>,
    rows: usize,
}

/// Appends decision batches to time-rotated Parquet files
///
/// A file is finalized, and becomes readable, when it rotates or the writer
/// is closed.
pub struct AuditWriter {
    output_dir: PathBuf,
    rotation_interval: Duration,
    current: Option<OpenFile>,
}

impl AuditWriter {
    pub fn new(output_dir: PathBuf, rotation_interval_secs: u64) -> Self {
        Self {
            output_dir,
            rotation_interval: Duration::seconds(rotation_interval_secs as i64),
            current: None,
        }
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Check if the open file has outlived the rotation interval
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        match &self.current {
            None => true,
            Some(open) => now - open.started >= self.rotation_interval,
        }
    }

    pub fn file_path(&self, timestamp: DateTime<Utc>) -> PathBuf {
        let filename = format!("decisions_{}.parquet", timestamp.format("%Y%m%d_%H%M%S_%3f"));
        self.output_dir.join(filename)
    }

    /// Path of the file currently being written
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|open| open.path.as_path())
    }

    /// Write one batch, rotating first if the interval has elapsed
    pub fn write(&mut self, records: &[DecisionRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        if self.needs_rotation(now) {
            self.close()?;
            self.open(now)?;
        }
        let Some(open) = self.current.as_mut() else {
            anyhow::bail!("No open audit file");
        };

        let batch = decision_batch(records)?;
        open.writer.write(&batch)?;
        open.writer.flush()?;
        open.rows += records.len();

        tracing::debug!(path = ?open.path, count = records.len(), "Wrote decisions to Parquet");
        Ok(())
    }

    /// Finalize the open file, returning its path
    pub fn close(&mut self) -> anyhow::Result<Option<PathBuf>> {
        let Some(open) = self.current.take() else {
            return Ok(None);
        };
        open.writer.close()?;
        tracing::info!(path = ?open.path, rows = open.rows, "Closed decision audit file");
        Ok(Some(open.path))
    }

    fn open(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.ensure_dir()?;

        let path = self.file_path(now);
        let file = File::create(&path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, Arc::new(decision_schema()), Some(props))?;

        self.current = Some(OpenFile {
            path,
            started: now,
            writer,
            rows: 0,
        });
        Ok(())
    }
}

fn decision_batch(records: &[DecisionRecord]) -> anyhow::Result<RecordBatch> {
    let decisions: Vec<&Decision> = records.iter().map(|r| &r.decision).collect();

    let recorded_at: Vec<i64> = records
        .iter()
        .map(|r| r.recorded_at.timestamp_micros())
        .collect();
    let signal_ids: Vec<String> = decisions.iter().map(|d| d.signal_id.to_string()).collect();
    let symbols: Vec<&str> = decisions.iter().map(|d| d.symbol.as_str()).collect();
    let sides: Vec<&str> = decisions.iter().map(|d| d.side.as_str()).collect();
    let requested: Vec<String> = decisions
        .iter()
        .map(|d| d.requested_fraction.to_string())
        .collect();
    let approved: Vec<String> = decisions
        .iter()
        .map(|d| d.approved_fraction.to_string())
        .collect();
    let quantities: Vec<String> = decisions
        .iter()
        .map(|d| d.approved_quantity.to_string())
        .collect();
    let prices: Vec<Option<String>> = decisions
        .iter()
        .map(|d| d.reference_price.map(|p| p.to_string()))
        .collect();
    let reasons: Vec<Option<String>> = decisions
        .iter()
        .map(|d| d.rejection_reason.map(|r| serde_json::to_string(&r)).transpose())
        .collect::<Result<_, _>>()?;
    let adjustments: Vec<String> = decisions
        .iter()
        .map(|d| serde_json::to_string(&d.adjustments))
        .collect::<Result<_, _>>()?;
    let histories: Vec<&str> = decisions
        .iter()
        .map(|d| match d.history {
            HistoryStatus::Complete => "complete",
            HistoryStatus::Insufficient => "insufficient",
        })
        .collect();
    let snapshot_versions: Vec<u64> = decisions.iter().map(|d| d.snapshot_version).collect();
    let limits_versions: Vec<u64> = decisions.iter().map(|d| d.limits_version).collect();
    let applied_versions: Vec<Option<u64>> =
        decisions.iter().map(|d| d.applied_version).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(recorded_at).with_timezone("UTC")),
        Arc::new(StringArray::from(signal_ids)),
        Arc::new(StringArray::from(symbols)),
        Arc::new(StringArray::from(sides)),
        Arc::new(StringArray::from(requested)),
        Arc::new(StringArray::from(approved)),
        Arc::new(StringArray::from(quantities)),
        Arc::new(StringArray::from(prices)),
        Arc::new(StringArray::from(reasons)),
        Arc::new(StringArray::from(adjustments)),
        Arc::new(StringArray::from(histories)),
        Arc::new(UInt64Array::from(snapshot_versions)),
        Arc::new(UInt64Array::from(limits_versions)),
        Arc::new(UInt64Array::from(applied_versions)),
    ];

    Ok(RecordBatch::try_new(Arc::new(decision_schema()), columns)?)
}

/// Reader for decision audit files
pub struct AuditReader {
    path: PathBuf,
}

impl AuditReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read every decision record in the file
    pub fn read_decisions(&self) -> anyhow::Result<Vec<DecisionRecord>> {
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;

            let recorded_at = column::<TimestampMicrosecondArray>(&batch, 0, "recorded_at")?;
            let signal_ids = column::<StringArray>(&batch, 1, "signal_id")?;
            let symbols = column::<StringArray>(&batch, 2, "symbol")?;
            let sides = column::<StringArray>(&batch, 3, "side")?;
            let requested = column::<StringArray>(&batch, 4, "requested_fraction")?;
            let approved = column::<StringArray>(&batch, 5, "approved_fraction")?;
            let quantities = column::<StringArray>(&batch, 6, "approved_quantity")?;
            let prices = column::<StringArray>(&batch, 7, "reference_price")?;
            let reasons = column::<StringArray>(&batch, 8, "rejection_reason")?;
            let adjustments = column::<StringArray>(&batch, 9, "adjustments")?;
            let histories = column::<StringArray>(&batch, 10, "history")?;
            let snapshot_versions = column::<UInt64Array>(&batch, 11, "snapshot_version")?;
            let limits_versions = column::<UInt64Array>(&batch, 12, "limits_version")?;
            let applied_versions = column::<UInt64Array>(&batch, 13, "applied_version")?;

            for i in 0..batch.num_rows() {
                let recorded = DateTime::from_timestamp_micros(recorded_at.value(i))
                    .ok_or_else(|| anyhow::anyhow!("Invalid recorded_at timestamp"))?;

                let side = match sides.value(i) {
                    "long" => Side::Long,
                    "short" => Side::Short,
                    other => anyhow::bail!("Invalid side {}", other),
                };
                let history = match histories.value(i) {
                    "complete" => HistoryStatus::Complete,
                    "insufficient" => HistoryStatus::Insufficient,
                    other => anyhow::bail!("Invalid history status {}", other),
                };
                let reference_price = if prices.is_null(i) {
                    None
                } else {
                    Some(Decimal::from_str(prices.value(i))?)
                };
                let rejection_reason: Option<RejectReason> = if reasons.is_null(i) {
                    None
                } else {
                    Some(serde_json::from_str(reasons.value(i))?)
                };
                let adjustments: Vec<LimitKind> = serde_json::from_str(adjustments.value(i))?;
                let applied_version = if applied_versions.is_null(i) {
                    None
                } else {
                    Some(applied_versions.value(i))
                };

                records.push(DecisionRecord {
                    recorded_at: recorded,
                    decision: Decision {
                        signal_id: Uuid::parse_str(signal_ids.value(i))?,
                        symbol: symbols.value(i).to_string(),
                        side,
                        requested_fraction: Decimal::from_str(requested.value(i))?,
                        approved_fraction: Decimal::from_str(approved.value(i))?,
                        approved_quantity: Decimal::from_str(quantities.value(i))?,
                        reference_price,
                        rejection_reason,
                        adjustments,
                        history,
                        snapshot_version: snapshot_versions.value(i),
                        limits_version: limits_versions.value(i),
                        applied_version,
                    },
                });
            }
        }

        Ok(records)
    }
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    index: usize,
    name: &str,
) -> anyhow::Result<&'a T> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
}
