//! Run command implementation

use super::events::{parse_line, InputEvent};
use crate::arbiter::{ConstraintArbiter, Decision};
use crate::audit::AuditRecorder;
use crate::config::Config;
use crate::history::{seed_portfolio, JsonHistoryFile};
use crate::monitor::{HistoricalRiskModel, RiskMonitor};
use crate::portfolio::{PortfolioState, PortfolioWriter};
use crate::risk::{LimitsStore, RiskError};
use crate::telemetry::{self, GaugeMetric};
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Newline-delimited JSON events; reads stdin when absent
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// JSON price history used to seed return series
    #[arg(long)]
    pub history: Option<PathBuf>,
}

impl RunArgs {
    pub async fn execute(&self, config: Config, config_path: &Path) -> anyhow::Result<()> {
        let state = PortfolioState::new(&config.portfolio);
        let (portfolio, writer_task) =
            PortfolioWriter::spawn(state, config.portfolio.command_buffer);
        let limits = Arc::new(LimitsStore::new(
            config.limits.clone(),
            config.portfolio.history_capacity,
        )?);
        telemetry::set_gauge(GaugeMetric::LimitsVersion, limits.current().version as f64);

        if let Some(path) = &self.history {
            let history = JsonHistoryFile::load(path)?;
            let seeded =
                seed_portfolio(&history, &portfolio, config.portfolio.history_capacity).await?;
            tracing::info!(symbols = seeded, path = ?path, "Loaded return history");
        }

        let (alert_tx, mut alert_rx) = mpsc::channel(config.monitor.alert_buffer.max(1));
        let monitor = RiskMonitor::spawn(
            portfolio.clone(),
            limits.clone(),
            HistoricalRiskModel::new(),
            config.monitor.clone(),
            alert_tx,
        );

        let alert_task = tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                match serde_json::to_string(&alert) {
                    Ok(json) => tracing::info!(alert = %json, "Risk alert raised"),
                    Err(e) => tracing::error!(error = %e, "Failed to serialize alert"),
                }
            }
        });

        let mut risk_rx = monitor.subscribe();
        let snapshot_task = tokio::spawn(async move {
            while risk_rx.changed().await.is_ok() {
                let latest = risk_rx.borrow_and_update().clone();
                if let Some(risk) = latest {
                    tracing::debug!(
                        portfolio_version = risk.portfolio_version,
                        status = ?risk.status,
                        drawdown = %risk.current_drawdown,
                        var = ?risk.value_at_risk,
                        leverage = ?risk.leverage,
                        max_correlation = ?risk
                            .correlation_matrix
                            .as_ref()
                            .and_then(|m| m.max_pairwise()),
                        age_ms = risk.age_ms,
                        "Risk snapshot"
                    );
                }
            }
        });

        let audit = config
            .audit
            .enabled
            .then(|| AuditRecorder::new(&config.audit));
        let arbiter = ConstraintArbiter::new(portfolio.clone(), limits.clone());

        let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &self.input {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open input {}", path.display()))?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };

        tracing::info!(limits_version = limits.current().version, "Processing events");
        let mut lines = reader.lines();
        let mut stdout = tokio::io::stdout();
        let mut line_no = 0u64;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let event = match parse_line(&line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(line = line_no, error = %e, "Skipping malformed event");
                    continue;
                }
            };

            match event {
                InputEvent::Price(tick) => match portfolio.update_price(tick).await {
                    Ok(_) => {}
                    Err(e) if e.is_hard_failure() => return Err(e.into()),
                    Err(e) => tracing::debug!(line = line_no, error = %e, "Price tick skipped"),
                },
                InputEvent::Signal(signal) => match arbiter.evaluate(&signal).await {
                    Ok(decision) => {
                        write_decision(&mut stdout, &decision).await?;
                        if let Some(audit) = &audit {
                            audit.record(&decision).await;
                        }
                    }
                    Err(RiskError::InvalidSignal(reason)) => {
                        tracing::error!(line = line_no, signal_id = %signal.id, reason = %reason, "Invalid signal");
                    }
                    Err(e) if e.is_hard_failure() => return Err(e.into()),
                    Err(e) => {
                        tracing::warn!(line = line_no, signal_id = %signal.id, error = %e, "Signal skipped");
                    }
                },
                InputEvent::Reload { path } => {
                    let path = path.as_deref().unwrap_or(config_path);
                    match limits.reload_from_file(path) {
                        Ok(version) => {
                            telemetry::set_gauge(GaugeMetric::LimitsVersion, version as f64)
                        }
                        Err(e) => {
                            tracing::error!(path = ?path, error = %e, "Limits reload rejected")
                        }
                    }
                }
            }
        }

        let final_snapshot = portfolio.snapshot();
        tracing::info!(
            version = final_snapshot.version,
            equity = %final_snapshot.equity,
            drawdown = %final_snapshot.drawdown(),
            positions = final_snapshot.positions.len(),
            "Input exhausted, shutting down"
        );

        monitor.shutdown().await;
        if let Some(audit) = audit {
            let stats = audit.shutdown().await;
            tracing::info!(written = stats.decisions_written, dropped = stats.decisions_dropped, "Audit trail closed");
        }
        drop(arbiter);
        drop(portfolio);
        writer_task.await?;
        alert_task.await?;
        snapshot_task.await?;

        Ok(())
    }
}

async fn write_decision(stdout: &mut tokio::io::Stdout, decision: &Decision) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(decision)?;
    json.push('\n');
    stdout.write_all(json.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
