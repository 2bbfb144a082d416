//! Risk monitor against a live portfolio writer

use kelly_gate::arbiter::ConstraintArbiter;
use kelly_gate::config::{MonitorConfig, PortfolioConfig};
use kelly_gate::feed::PriceTick;
use kelly_gate::monitor::{
    AlertKind, HistoricalRiskModel, RiskAlert, RiskModel, RiskMonitor, RiskSnapshot,
    SnapshotStatus,
};
use kelly_gate::portfolio::{PortfolioHandle, PortfolioSnapshot, PortfolioState, PortfolioWriter};
use kelly_gate::risk::{LimitsStore, RiskLimits};
use kelly_gate::signal::Signal;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

struct Harness {
    arbiter: ConstraintArbiter,
    portfolio: PortfolioHandle,
    limits: Arc<LimitsStore>,
}

fn harness(limits: RiskLimits) -> Harness {
    let state = PortfolioState::new(&PortfolioConfig {
        initial_cash: dec!(100000),
        history_capacity: 64,
        ..PortfolioConfig::default()
    });
    let (portfolio, _task) = PortfolioWriter::spawn(state, 64);
    let limits = Arc::new(LimitsStore::new(limits, 64).unwrap());
    Harness {
        arbiter: ConstraintArbiter::new(portfolio.clone(), limits.clone()),
        portfolio,
        limits,
    }
}

fn monitor_config(tick_ms: u64) -> MonitorConfig {
    MonitorConfig {
        tick_interval_ms: tick_ms,
        ..MonitorConfig::default()
    }
}

async fn wait_for<F>(rx: &mut watch::Receiver<Option<RiskSnapshot>>, pred: F) -> RiskSnapshot
where
    F: Fn(&RiskSnapshot) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(snap) = rx.borrow_and_update().clone() {
                if pred(&snap) {
                    return snap;
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_var_from_seeded_history() {
    let h = harness(RiskLimits {
        var_window: 5,
        ..RiskLimits::default()
    });
    h.portfolio
        .seed_returns("AAPL", vec![-0.10, 0.02, 0.03, -0.05, 0.01])
        .await
        .unwrap();
    h.portfolio
        .update_price(PriceTick::new("AAPL", dec!(100)))
        .await
        .unwrap();
    let decision = h
        .arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.6), dec!(2)))
        .await
        .unwrap();
    let applied = decision.applied_version.unwrap();

    let (alert_tx, _alert_rx) = mpsc::channel(8);
    let monitor = RiskMonitor::spawn(
        h.portfolio.clone(),
        h.limits.clone(),
        HistoricalRiskModel::new(),
        monitor_config(20),
        alert_tx,
    );

    let mut rx = monitor.subscribe();
    let risk = wait_for(&mut rx, |s| s.portfolio_version == applied).await;
    assert_eq!(risk.status, SnapshotStatus::Fresh);
    assert_eq!(risk.current_drawdown, dec!(0));

    let var = risk.value_at_risk.unwrap();
    assert!(var > Decimal::ZERO);
    // A single holding worth 10% of equity loses at most 10% of its value
    assert!(var <= dec!(0.0100001));
    assert!(risk.value_at_risk_amount.unwrap() > Decimal::ZERO);

    let matrix = risk.correlation_matrix.unwrap();
    assert_eq!(matrix.symbols, vec!["AAPL".to_string()]);
    assert_eq!(matrix.get("AAPL", "AAPL"), Some(dec!(1)));

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_holding_without_history_is_flagged() {
    let h = harness(RiskLimits {
        var_window: 5,
        ..RiskLimits::default()
    });
    h.portfolio
        .update_price(PriceTick::new("MSFT", dec!(50)))
        .await
        .unwrap();
    h.arbiter
        .evaluate(&Signal::new("MSFT", dec!(0.6), dec!(2)))
        .await
        .unwrap();

    let (alert_tx, _alert_rx) = mpsc::channel(8);
    let monitor = RiskMonitor::spawn(
        h.portfolio.clone(),
        h.limits.clone(),
        HistoricalRiskModel::new(),
        monitor_config(20),
        alert_tx,
    );

    let mut rx = monitor.subscribe();
    let risk = wait_for(&mut rx, |s| s.portfolio_version == h.portfolio.version()).await;
    assert_eq!(risk.status, SnapshotStatus::InsufficientHistory);
    assert!(risk.value_at_risk.is_none());
    assert!(risk.is_fresh());
    assert!(risk.leverage.is_some());

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_drawdown_alert_once_per_episode() {
    let h = harness(RiskLimits {
        max_position_size: dec!(1),
        kelly_fraction: dec!(1),
        var_window: 5,
        ..RiskLimits::default()
    });
    h.portfolio
        .update_price(PriceTick::new("AAPL", dec!(100)))
        .await
        .unwrap();
    h.arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.9), dec!(9)))
        .await
        .unwrap();

    let (alert_tx, mut alert_rx) = mpsc::channel::<RiskAlert>(8);
    let monitor = RiskMonitor::spawn(
        h.portfolio.clone(),
        h.limits.clone(),
        HistoricalRiskModel::new(),
        monitor_config(10),
        alert_tx,
    );

    // 0.8 * 20% = 16% alert threshold; a 25% drop on ~89% exposure breaches it
    h.portfolio
        .update_price(PriceTick::new("AAPL", dec!(75)))
        .await
        .unwrap();

    let alert = timeout(Duration::from_secs(5), alert_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.kind, AlertKind::Drawdown);
    assert_eq!(alert.threshold, dec!(0.16));
    assert!(alert.value > dec!(0.2));

    // Further fresh snapshots inside the same episode stay quiet
    let mut rx = monitor.subscribe();
    let current = h.portfolio.version();
    let first = wait_for(&mut rx, |s| s.portfolio_version == current).await;
    wait_for(&mut rx, |s| s.generation >= first.generation + 3).await;
    assert!(alert_rx.try_recv().is_err());

    monitor.shutdown().await;
}

/// Fast on the first call, then slower than the tick
struct SlowAfterFirst {
    calls: AtomicUsize,
    delay: Duration,
}

impl RiskModel for SlowAfterFirst {
    fn compute(&self, snapshot: &PortfolioSnapshot, limits: &RiskLimits) -> RiskSnapshot {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            std::thread::sleep(self.delay);
        }
        HistoricalRiskModel.compute(snapshot, limits)
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overrun_goes_stale_without_blocking_decisions() {
    let h = harness(RiskLimits {
        var_window: 5,
        ..RiskLimits::default()
    });
    h.portfolio
        .update_price(PriceTick::new("AAPL", dec!(100)))
        .await
        .unwrap();

    let (alert_tx, _alert_rx) = mpsc::channel(8);
    let model = SlowAfterFirst {
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(400),
    };
    let monitor = RiskMonitor::spawn(
        h.portfolio.clone(),
        h.limits.clone(),
        model,
        monitor_config(50),
        alert_tx,
    );

    let mut rx = monitor.subscribe();
    let fresh = wait_for(&mut rx, |s| s.is_fresh()).await;
    let stale = wait_for(&mut rx, |s| s.status == SnapshotStatus::Stale).await;
    assert_eq!(stale.generation, fresh.generation);
    assert_eq!(stale.timestamp, fresh.timestamp);
    assert!(stale.age_ms >= 1);

    // Sizing and applying proceed while the computation is still running
    let decision = timeout(
        Duration::from_millis(200),
        h.arbiter.evaluate(&Signal::new("AAPL", dec!(0.6), dec!(2))),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(decision.applied_version.is_some());

    monitor.shutdown().await;
}
