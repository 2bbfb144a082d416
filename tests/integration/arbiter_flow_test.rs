//! End-to-end sizing flow through the arbiter and portfolio writer

use kelly_gate::arbiter::ConstraintArbiter;
use kelly_gate::config::PortfolioConfig;
use kelly_gate::feed::PriceTick;
use kelly_gate::portfolio::{PortfolioState, PortfolioWriter};
use kelly_gate::risk::{LimitKind, LimitsStore, RejectReason, RiskLimits};
use kelly_gate::signal::{Side, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn arbiter_with(limits: RiskLimits) -> ConstraintArbiter {
    let state = PortfolioState::new(&PortfolioConfig {
        initial_cash: dec!(100000),
        history_capacity: 64,
        ..PortfolioConfig::default()
    });
    let (handle, _task) = PortfolioWriter::spawn(state, 64);
    let store = Arc::new(LimitsStore::new(limits, 64).unwrap());
    ConstraintArbiter::new(handle, store)
}

/// Full Kelly, uncapped orders
fn aggressive_limits() -> RiskLimits {
    RiskLimits {
        max_position_size: dec!(1),
        kelly_fraction: dec!(1),
        var_window: 5,
        ..RiskLimits::default()
    }
}

async fn price(arbiter: &ConstraintArbiter, symbol: &str, price: Decimal) {
    arbiter
        .portfolio()
        .update_price(PriceTick::new(symbol, price))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_half_kelly_capped_by_position_size() {
    let arbiter = arbiter_with(RiskLimits {
        var_window: 5,
        ..RiskLimits::default()
    });
    price(&arbiter, "AAPL", dec!(100)).await;

    let decision = arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.6), dec!(2)))
        .await
        .unwrap();

    assert_eq!(decision.requested_fraction, dec!(0.2));
    assert_eq!(decision.approved_fraction, dec!(0.1));
    assert_eq!(decision.approved_quantity, dec!(100));
    assert_eq!(decision.reference_price, Some(dec!(100)));
    assert!(decision.rejection_reason.is_none());
    assert_eq!(decision.applied_version, Some(2));
}

#[tokio::test]
async fn test_drawdown_gates_new_exposure_but_allows_reduction() {
    let arbiter = arbiter_with(aggressive_limits());
    price(&arbiter, "AAPL", dec!(100)).await;

    let opened = arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.9), dec!(9)))
        .await
        .unwrap();
    assert!(opened.is_approved());
    let held = opened.approved_quantity;
    assert!(held > Decimal::ZERO);

    // A 25% drop takes the portfolio past the 20% drawdown limit
    price(&arbiter, "AAPL", dec!(75)).await;
    let snapshot = arbiter.portfolio().snapshot();
    assert!(snapshot.drawdown() > dec!(0.22));

    let add = arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.9), dec!(9)))
        .await
        .unwrap();
    assert_eq!(add.approved_fraction, dec!(0));
    assert_eq!(
        add.rejection_reason,
        Some(RejectReason::LimitBreach(LimitKind::MaxDrawdown))
    );
    assert!(add.applied_version.is_none());

    let other = arbiter
        .evaluate(&Signal::new("MSFT", dec!(0.9), dec!(9)))
        .await
        .unwrap();
    assert_eq!(other.rejection_reason, Some(RejectReason::NoPrice));

    let reduce = arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.9), dec!(9)).with_side(Side::Short))
        .await
        .unwrap();
    assert!(reduce.is_approved());
    assert!(reduce.approved_fraction < reduce.requested_fraction);
    assert!(reduce.adjustments.contains(&LimitKind::MaxDrawdown));
    assert!(reduce.approved_quantity < Decimal::ZERO);
    assert!((reduce.approved_quantity + held).abs() < dec!(0.0001));

    // Never flips the position short
    let after = arbiter.portfolio().snapshot();
    assert!(after.exposure("AAPL") >= Decimal::ZERO);
}

#[tokio::test]
async fn test_gap_then_new_level_still_gates_drawdown() {
    let arbiter = arbiter_with(aggressive_limits());
    price(&arbiter, "AAPL", dec!(100)).await;

    let opened = arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.9), dec!(9)))
        .await
        .unwrap();
    assert!(opened.is_approved());

    // A 60% gap, then trading continues around the new level
    for p in [dec!(40), dec!(41), dec!(39), dec!(40)] {
        price(&arbiter, "AAPL", p).await;
    }

    let snapshot = arbiter.portfolio().snapshot();
    assert_eq!(snapshot.price("AAPL"), Some(dec!(40)));
    assert!(snapshot.drawdown() > dec!(0.5));

    let add = arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.9), dec!(9)))
        .await
        .unwrap();
    assert_eq!(add.approved_fraction, dec!(0));
    assert_eq!(
        add.rejection_reason,
        Some(RejectReason::LimitBreach(LimitKind::MaxDrawdown))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decide_matches_sequential() {
    let arbiter = arbiter_with(RiskLimits {
        var_window: 5,
        ..RiskLimits::default()
    });
    arbiter
        .portfolio()
        .seed_returns("AAPL", vec![0.01, -0.02, 0.015, -0.01, 0.02])
        .await
        .unwrap();
    arbiter
        .portfolio()
        .seed_returns("MSFT", vec![0.012, -0.018, 0.01, -0.012, 0.025])
        .await
        .unwrap();
    price(&arbiter, "AAPL", dec!(100)).await;
    price(&arbiter, "MSFT", dec!(50)).await;
    arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.6), dec!(2)))
        .await
        .unwrap();

    let snapshot = arbiter.portfolio().snapshot();
    let limits = arbiter.limits().current();
    let signals: Vec<Signal> = (0..16)
        .map(|i| {
            let side = if i % 2 == 0 { Side::Long } else { Side::Short };
            Signal::new("MSFT", dec!(0.55) + Decimal::new(i, 3), dec!(1.5)).with_side(side)
        })
        .collect();

    let sequential: Vec<_> = signals
        .iter()
        .map(|s| arbiter.decide(s, &snapshot, &limits).unwrap())
        .collect();

    // Keep the writer busy while the decisions run
    let writer = arbiter.portfolio().clone();
    let ticker = tokio::spawn(async move {
        for i in 0..50 {
            let p = dec!(100) + Decimal::new(i % 5, 1);
            writer
                .update_price(PriceTick::new("AAPL", p))
                .await
                .unwrap();
        }
    });

    let tasks: Vec<_> = signals
        .iter()
        .cloned()
        .map(|signal| {
            let arbiter = arbiter.clone();
            let snapshot = snapshot.clone();
            let limits = limits.clone();
            tokio::spawn(async move { arbiter.decide(&signal, &snapshot, &limits).unwrap() })
        })
        .collect();

    let mut concurrent = Vec::with_capacity(tasks.len());
    for task in tasks {
        concurrent.push(task.await.unwrap());
    }
    ticker.await.unwrap();

    assert_eq!(concurrent, sequential);
    assert!(arbiter.portfolio().version() > snapshot.version);
}

#[tokio::test]
async fn test_reload_mid_flight_keeps_held_version() {
    let arbiter = arbiter_with(RiskLimits {
        var_window: 5,
        ..RiskLimits::default()
    });
    price(&arbiter, "AAPL", dec!(100)).await;

    let snapshot = arbiter.portfolio().snapshot();
    let held = arbiter.limits().current();

    arbiter
        .limits()
        .reload(RiskLimits {
            max_position_size: dec!(0.05),
            var_window: 5,
            ..RiskLimits::default()
        })
        .unwrap();

    let signal = Signal::new("AAPL", dec!(0.6), dec!(2));
    let in_flight = arbiter.decide(&signal, &snapshot, &held).unwrap();
    assert_eq!(in_flight.limits_version, 1);
    assert_eq!(in_flight.approved_fraction, dec!(0.1));

    let next = arbiter
        .evaluate(&Signal::new("AAPL", dec!(0.6), dec!(2)))
        .await
        .unwrap();
    assert_eq!(next.limits_version, 2);
    assert_eq!(next.approved_fraction, dec!(0.05));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_evaluations_respect_leverage() {
    let arbiter = arbiter_with(RiskLimits {
        max_position_size: dec!(0.5),
        kelly_fraction: dec!(1),
        max_leverage: dec!(2),
        var_window: 5,
        ..RiskLimits::default()
    });
    let symbols: Vec<String> = (0..10).map(|i| format!("SYM{}", i)).collect();
    for symbol in &symbols {
        price(&arbiter, symbol, dec!(100)).await;
    }

    let tasks: Vec<_> = symbols
        .iter()
        .map(|symbol| {
            let arbiter = arbiter.clone();
            let signal = Signal::new(symbol.as_str(), dec!(0.9), dec!(9));
            tokio::spawn(async move { arbiter.evaluate(&signal).await.unwrap() })
        })
        .collect();

    let mut decisions = Vec::new();
    for task in tasks {
        decisions.push(task.await.unwrap());
    }

    let snapshot = arbiter.portfolio().snapshot();
    let leverage = snapshot.leverage().unwrap();
    assert!(leverage <= dec!(2.0000001), "leverage {}", leverage);

    let approved: Decimal = decisions
        .iter()
        .filter(|d| d.is_approved())
        .map(|d| d.approved_fraction)
        .sum();
    assert!(approved <= dec!(2.0000001));
    assert!(decisions
        .iter()
        .filter(|d| !d.is_approved())
        .all(|d| d.rejection_reason == Some(RejectReason::LimitBreach(LimitKind::MaxLeverage))));
}
