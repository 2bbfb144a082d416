//! Buffered decision recorder

use super::parquet::{AuditWriter, DecisionRecord};
use crate::arbiter::Decision;
use crate::config::AuditConfig;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Recording statistics
#[derive(Debug, Default, Clone)]
pub struct RecorderStats {
    pub decisions_received: u64,
    pub decisions_written: u64,
    /// Dropped because the channel was full
    pub decisions_dropped: u64,
    pub flushes: u64,
    pub last_flush: Option<chrono::DateTime<Utc>>,
}

/// Records decisions to Parquet off the decision path
pub struct AuditRecorder {
    tx: mpsc::Sender<DecisionRecord>,
    stats: Arc<RwLock<RecorderStats>>,
    task: JoinHandle<()>,
}

impl AuditRecorder {
    /// Spawn the writer task
    pub fn new(config: &AuditConfig) -> Self {
        let buffer_size = config.buffer_size.max(1);
        let (tx, rx) = mpsc::channel(buffer_size * 4);
        let stats = Arc::new(RwLock::new(RecorderStats::default()));

        let writer = AuditWriter::new(config.output_dir.clone(), config.rotation_interval_secs);
        let task = tokio::spawn(Self::run_writer(
            rx,
            writer,
            buffer_size,
            config.flush_interval_secs.max(1),
            stats.clone(),
        ));

        tracing::info!(output_dir = ?config.output_dir, "Decision audit recorder started");
        Self { tx, stats, task }
    }

    /// Queue a decision; never waits on disk
    pub async fn record(&self, decision: &Decision) {
        let record = DecisionRecord {
            recorded_at: Utc::now(),
            decision: decision.clone(),
        };
        match self.tx.try_send(record) {
            Ok(()) => {
                self.stats.write().await.decisions_received += 1;
            }
            Err(e) => {
                tracing::warn!(signal_id = %decision.signal_id, error = %e, "Dropping audit record");
                self.stats.write().await.decisions_dropped += 1;
            }
        }
    }

    pub async fn stats(&self) -> RecorderStats {
        self.stats.read().await.clone()
    }

    /// Flush what is buffered, finalize the open file and stop
    pub async fn shutdown(self) -> RecorderStats {
        let Self { tx, stats, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Audit writer task failed");
        }
        let stats = stats.read().await.clone();
        stats
    }

    async fn run_writer(
        mut rx: mpsc::Receiver<DecisionRecord>,
        mut writer: AuditWriter,
        buffer_size: usize,
        flush_interval_secs: u64,
        stats: Arc<RwLock<RecorderStats>>,
    ) {
        let mut buffer: Vec<DecisionRecord> = Vec::with_capacity(buffer_size);
        let mut last_flush = Utc::now();
        let flush_interval = Duration::seconds(flush_interval_secs as i64);

        loop {
            let timeout = tokio::time::Duration::from_secs(flush_interval_secs);

            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(record) => {
                            buffer.push(record);
                            if buffer.len() >= buffer_size {
                                Self::flush(&mut buffer, &mut writer, &stats).await;
                                last_flush = Utc::now();
                            }
                        }
                        None => {
                            Self::flush(&mut buffer, &mut writer, &stats).await;
                            if let Err(e) = writer.close() {
                                tracing::error!(error = %e, "Failed to close audit file");
                            }
                            tracing::info!("Audit writer shutting down");
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep(timeout) => {
                    let now = Utc::now();
                    if now - last_flush >= flush_interval && !buffer.is_empty() {
                        Self::flush(&mut buffer, &mut writer, &stats).await;
                        last_flush = now;
                    }
                }
            }
        }
    }

    async fn flush(
        buffer: &mut Vec<DecisionRecord>,
        writer: &mut AuditWriter,
        stats: &Arc<RwLock<RecorderStats>>,
    ) {
        if buffer.is_empty() {
            return;
        }

        let count = buffer.len();
        match writer.write(buffer) {
            Ok(()) => {
                let mut s = stats.write().await;
                s.decisions_written += count as u64;
                s.flushes += 1;
                s.last_flush = Some(Utc::now());
                tracing::debug!(count, "Flushed decisions");
            }
            Err(e) => {
                tracing::error!(error = %e, count, "Failed to write decisions");
            }
        }

        buffer.clear();
    }
}
