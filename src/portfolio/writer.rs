//! Single-writer task for portfolio mutations
//!
//! All price refreshes, history seeding and fills are queued to one task
//! that owns [`PortfolioState`]. After each mutation the task publishes the
//! new snapshot through an `ArcSwap`; readers load it without waiting on the
//! writer or each other.

use super::{PortfolioSnapshot, PortfolioState};
use crate::feed::PriceTick;
use crate::risk::{RejectReason, RiskError, RiskLimitEngine, VersionedLimits};
use crate::signal::Side;
use crate::telemetry::{self, GaugeMetric};
use arc_swap::ArcSwap;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Request to fill an approved decision
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub signal_id: Uuid,
    pub symbol: String,
    pub side: Side,
    /// Kelly size before limits, used if the fill must be re-checked
    pub raw_fraction: Decimal,
    /// Size approved at evaluation time
    pub approved_fraction: Decimal,
    /// Portfolio version the evaluation read
    pub evaluated_version: u64,
    /// Limits version the evaluation used
    pub limits: Arc<VersionedLimits>,
}

/// What the writer did with an apply request
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied {
        /// Portfolio version produced by the fill
        version: u64,
        /// Signed quantity filled
        quantity: Decimal,
        price: Decimal,
        /// Fraction actually filled, never above the evaluated approval
        approved_fraction: Decimal,
        /// Newer version the fill was re-checked against, if any
        revalidated_against: Option<u64>,
    },
    Rejected {
        reason: RejectReason,
        revalidated_against: Option<u64>,
    },
    /// Signal id already filled
    Duplicate,
}

enum PortfolioCommand {
    Price {
        tick: PriceTick,
        reply: oneshot::Sender<Result<u64, RiskError>>,
    },
    Seed {
        symbol: String,
        returns: Vec<f64>,
        reply: oneshot::Sender<u64>,
    },
    Apply {
        request: ApplyRequest,
        reply: oneshot::Sender<ApplyOutcome>,
    },
}

/// Cloneable access to the portfolio writer and its published snapshots
#[derive(Clone)]
pub struct PortfolioHandle {
    tx: mpsc::Sender<PortfolioCommand>,
    published: Arc<ArcSwap<PortfolioSnapshot>>,
}

impl PortfolioHandle {
    /// Latest published snapshot; never blocks
    pub fn snapshot(&self) -> Arc<PortfolioSnapshot> {
        self.published.load_full()
    }

    pub fn version(&self) -> u64 {
        self.published.load().version
    }

    /// Queue a price tick and wait for the version it produced
    pub async fn update_price(&self, tick: PriceTick) -> Result<u64, RiskError> {
        let (reply, rx) = oneshot::channel();
        self.send(PortfolioCommand::Price { tick, reply }).await?;
        rx.await.map_err(|_| RiskError::PortfolioUnavailable)?
    }

    /// Prepend historical returns for a symbol
    pub async fn seed_returns(
        &self,
        symbol: impl Into<String>,
        returns: Vec<f64>,
    ) -> Result<u64, RiskError> {
        let (reply, rx) = oneshot::channel();
        self.send(PortfolioCommand::Seed {
            symbol: symbol.into(),
            returns,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RiskError::PortfolioUnavailable)
    }

    /// Fill an approved decision, re-checking limits if the portfolio moved
    pub async fn apply(&self, request: ApplyRequest) -> Result<ApplyOutcome, RiskError> {
        let (reply, rx) = oneshot::channel();
        self.send(PortfolioCommand::Apply { request, reply }).await?;
        rx.await.map_err(|_| RiskError::PortfolioUnavailable)
    }

    async fn send(&self, command: PortfolioCommand) -> Result<(), RiskError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| RiskError::PortfolioUnavailable)
    }
}

/// Owns the portfolio and serializes every mutation
pub struct PortfolioWriter {
    state: PortfolioState,
    published: Arc<ArcSwap<PortfolioSnapshot>>,
    engine: RiskLimitEngine,
}

impl PortfolioWriter {
    /// Spawn the writer task; it exits once every handle is dropped
    pub fn spawn(state: PortfolioState, buffer: usize) -> (PortfolioHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let published = Arc::new(ArcSwap::new(state.snapshot()));

        let writer = Self {
            state,
            published: published.clone(),
            engine: RiskLimitEngine::new(),
        };
        let task = tokio::spawn(writer.run(rx));

        (PortfolioHandle { tx, published }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<PortfolioCommand>) {
        tracing::info!(version = self.state.version(), "Portfolio writer started");

        while let Some(command) = rx.recv().await {
            match command {
                PortfolioCommand::Price { tick, reply } => {
                    let result = self.state.apply_price(&tick);
                    match &result {
                        Ok(_) => self.publish(),
                        Err(e) => {
                            tracing::warn!(symbol = %tick.symbol, error = %e, "Rejected price tick");
                            telemetry::record_invalid_tick();
                        }
                    }
                    let _ = reply.send(result);
                }
                PortfolioCommand::Seed {
                    symbol,
                    returns,
                    reply,
                } => {
                    let version = self.state.seed_returns(&symbol, &returns);
                    tracing::debug!(symbol = %symbol, count = returns.len(), version, "Seeded return history");
                    self.publish();
                    let _ = reply.send(version);
                }
                PortfolioCommand::Apply { request, reply } => {
                    let outcome = self.apply(request);
                    if matches!(outcome, ApplyOutcome::Applied { .. }) {
                        self.publish();
                    }
                    let _ = reply.send(outcome);
                }
            }
        }

        tracing::info!(version = self.state.version(), "Portfolio writer stopped");
    }

    fn apply(&mut self, request: ApplyRequest) -> ApplyOutcome {
        if self.state.is_applied(&request.signal_id) {
            tracing::debug!(signal_id = %request.signal_id, "Duplicate apply ignored");
            return ApplyOutcome::Duplicate;
        }

        let current = self.state.current();
        let Some(price) = current.price(&request.symbol) else {
            return ApplyOutcome::Rejected {
                reason: RejectReason::NoPrice,
                revalidated_against: None,
            };
        };

        let mut fraction = request.approved_fraction;
        let mut revalidated_against = None;

        if current.version != request.evaluated_version {
            let check = self.engine.clip(
                request.raw_fraction,
                &request.symbol,
                request.side,
                current,
                &request.limits.limits,
            );
            fraction = fraction.min(check.approved_fraction);
            revalidated_against = Some(current.version);
            tracing::debug!(
                signal_id = %request.signal_id,
                evaluated = request.evaluated_version,
                current = current.version,
                approved = %fraction,
                "Re-validated apply against newer portfolio"
            );

            if fraction <= Decimal::ZERO {
                return ApplyOutcome::Rejected {
                    reason: check.rejection().unwrap_or(RejectReason::NoEdge),
                    revalidated_against,
                };
            }
        }

        let quantity = current
            .order_quantity(&request.symbol, request.side, fraction)
            .unwrap_or(Decimal::ZERO);
        if quantity.is_zero() {
            return ApplyOutcome::Rejected {
                reason: RejectReason::NoEdge,
                revalidated_against,
            };
        }

        let version = self.state.apply_fill(
            request.signal_id,
            &request.symbol,
            quantity,
            price,
            Utc::now(),
        );
        tracing::info!(
            signal_id = %request.signal_id,
            symbol = %request.symbol,
            quantity = %quantity,
            price = %price,
            version,
            "Applied decision"
        );

        ApplyOutcome::Applied {
            version,
            quantity,
            price,
            approved_fraction: fraction,
            revalidated_against,
        }
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        telemetry::set_gauge(GaugeMetric::PortfolioVersion, snapshot.version as f64);
        telemetry::set_decimal_gauge(GaugeMetric::Equity, snapshot.equity);
        telemetry::set_decimal_gauge(GaugeMetric::Drawdown, snapshot.drawdown());
        telemetry::set_gauge(GaugeMetric::OpenPositions, snapshot.positions.len() as f64);
        self.published.store(snapshot);
    }
}
