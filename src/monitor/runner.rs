//! Background risk recomputation loop

use super::{AlertTracker, RiskAlert, RiskModel, RiskSnapshot};
use crate::config::MonitorConfig;
use crate::portfolio::PortfolioHandle;
use crate::risk::{LimitsStore, RiskError};
use crate::telemetry::{self, GaugeMetric, LatencyMetric};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a running monitor
pub struct MonitorHandle {
    snapshots: watch::Receiver<Option<RiskSnapshot>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Receiver of every published snapshot, fresh or stale
    pub fn subscribe(&self) -> watch::Receiver<Option<RiskSnapshot>> {
        self.snapshots.clone()
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Option<RiskSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Risk monitor task failed");
        }
    }
}

/// A computation running on the blocking pool
struct InFlight {
    generation: u64,
    portfolio_version: u64,
    started: Instant,
    handle: JoinHandle<RiskSnapshot>,
}

/// Periodically recomputes drawdown, VaR and correlation off the decision path
pub struct RiskMonitor {
    portfolio: PortfolioHandle,
    limits: Arc<LimitsStore>,
    model: Arc<dyn RiskModel>,
    config: MonitorConfig,
    alert_tx: mpsc::Sender<RiskAlert>,
    tracker: AlertTracker,
    generation: u64,
    in_flight: Option<InFlight>,
    last_fresh: Option<RiskSnapshot>,
}

impl RiskMonitor {
    pub fn spawn(
        portfolio: PortfolioHandle,
        limits: Arc<LimitsStore>,
        model: impl RiskModel,
        config: MonitorConfig,
        alert_tx: mpsc::Sender<RiskAlert>,
    ) -> MonitorHandle {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let monitor = Self {
            portfolio,
            limits,
            model: Arc::new(model),
            config,
            alert_tx,
            tracker: AlertTracker::new(),
            generation: 0,
            in_flight: None,
            last_fresh: None,
        };
        let task = tokio::spawn(monitor.run(tx, cancel.clone()));

        MonitorHandle {
            snapshots: rx,
            cancel,
            task,
        }
    }

    async fn run(mut self, tx: watch::Sender<Option<RiskSnapshot>>, cancel: CancellationToken) {
        let tick = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            model = self.model.name(),
            tick_ms = tick.as_millis() as u64,
            "Risk monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.on_tick(tick, &tx).await;
        }

        if let Some(job) = self.in_flight.take() {
            job.handle.abort();
        }
        tracing::info!(generation = self.generation, "Risk monitor stopped");
    }

    async fn on_tick(&mut self, tick: Duration, tx: &watch::Sender<Option<RiskSnapshot>>) {
        let current_version = self.portfolio.version();

        // Harvest an overrunning computation from an earlier tick
        if let Some(job) = self.in_flight.take() {
            if !job.handle.is_finished() {
                self.in_flight = Some(job);
                self.publish_stale(tx);
                return;
            }

            let generation = job.generation;
            match job.handle.await {
                Ok(risk) if risk.portfolio_version == current_version => {
                    self.publish_fresh(risk, generation, tx);
                    return;
                }
                Ok(risk) => {
                    tracing::debug!(
                        generation,
                        computed = risk.portfolio_version,
                        current = current_version,
                        "Discarding late risk result for an older portfolio version"
                    );
                }
                Err(e) => tracing::error!(generation, error = %e, "Risk computation panicked"),
            }
        }

        let snapshot = self.portfolio.snapshot();
        let limits = self.limits.current();
        self.generation += 1;

        let model = self.model.clone();
        let params = limits.limits.clone();
        let started = Instant::now();
        let mut job = InFlight {
            generation: self.generation,
            portfolio_version: snapshot.version,
            started,
            handle: tokio::task::spawn_blocking(move || model.compute(&snapshot, &params)),
        };

        match timeout(tick, &mut job.handle).await {
            Ok(Ok(risk)) => {
                telemetry::record_latency(LatencyMetric::RiskComputation, started.elapsed());
                self.publish_fresh(risk, job.generation, tx);
            }
            Ok(Err(e)) => {
                tracing::error!(generation = job.generation, error = %e, "Risk computation panicked");
                self.publish_stale(tx);
            }
            Err(_) => {
                let e = RiskError::ComputationTimeout {
                    budget_ms: tick.as_millis() as u64,
                };
                tracing::warn!(
                    generation = job.generation,
                    portfolio_version = job.portfolio_version,
                    error = %e,
                    "Risk computation overran its tick"
                );
                self.in_flight = Some(job);
                self.publish_stale(tx);
            }
        }
    }

    fn publish_fresh(
        &mut self,
        mut risk: RiskSnapshot,
        generation: u64,
        tx: &watch::Sender<Option<RiskSnapshot>>,
    ) {
        risk.generation = generation;

        telemetry::set_decimal_gauge(GaugeMetric::Drawdown, risk.current_drawdown);
        if let Some(var) = risk.value_at_risk {
            telemetry::set_decimal_gauge(GaugeMetric::ValueAtRisk, var);
        }
        if let Some(leverage) = risk.leverage {
            telemetry::set_decimal_gauge(GaugeMetric::Leverage, leverage);
        }

        let limits = self.limits.current();
        for alert in self.tracker.evaluate(&risk, &limits.limits, &self.config) {
            telemetry::record_alert(alert.kind.as_str());
            tracing::warn!(
                kind = %alert.kind,
                value = %alert.value,
                threshold = %alert.threshold,
                portfolio_version = alert.portfolio_version,
                "Risk alert"
            );
            if let Err(e) = self.alert_tx.try_send(alert) {
                tracing::warn!(error = %e, "Dropping risk alert");
            }
        }

        tracing::debug!(
            generation,
            portfolio_version = risk.portfolio_version,
            status = ?risk.status,
            "Published risk snapshot"
        );
        self.last_fresh = Some(risk.clone());
        tx.send_replace(Some(risk));
    }

    fn publish_stale(&self, tx: &watch::Sender<Option<RiskSnapshot>>) {
        let Some(last) = self.last_fresh.clone() else {
            tracing::debug!("No earlier risk snapshot to republish");
            return;
        };
        if let Some(job) = &self.in_flight {
            tracing::debug!(
                generation = job.generation,
                running_ms = job.started.elapsed().as_millis() as u64,
                "Risk computation still running"
            );
        }
        telemetry::record_stale_snapshot();
        tx.send_replace(Some(last.into_stale(Utc::now())));
    }
}
