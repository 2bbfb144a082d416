//! Breach-episode alert tracking

use super::{AlertKind, RiskAlert, RiskSnapshot, SnapshotStatus};
use crate::config::MonitorConfig;
use crate::risk::RiskLimits;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Emits one alert per breach episode
///
/// An episode starts when a measure reaches its threshold and ends when a
/// fresh snapshot shows it back below. Stale snapshots never change state.
#[derive(Debug, Default)]
pub struct AlertTracker {
    active: HashSet<AlertKind>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, kind: AlertKind) -> bool {
        self.active.contains(&kind)
    }

    /// Alerts newly entering breach in this snapshot
    pub fn evaluate(
        &mut self,
        snapshot: &RiskSnapshot,
        limits: &RiskLimits,
        config: &MonitorConfig,
    ) -> Vec<RiskAlert> {
        if snapshot.status == SnapshotStatus::Stale {
            return Vec::new();
        }

        let checks = [
            (
                AlertKind::Drawdown,
                Some(snapshot.current_drawdown),
                Some(config.alert_threshold * limits.max_drawdown),
            ),
            (AlertKind::ValueAtRisk, snapshot.value_at_risk, config.var_limit),
            (AlertKind::Leverage, snapshot.leverage, Some(limits.max_leverage)),
        ];

        let mut alerts = Vec::new();
        for (kind, value, threshold) in checks {
            let (Some(value), Some(threshold)) = (value, threshold) else {
                continue;
            };
            if breached(kind, value, threshold) {
                if self.active.insert(kind) {
                    alerts.push(RiskAlert {
                        kind,
                        value,
                        threshold,
                        portfolio_version: snapshot.portfolio_version,
                        timestamp: Utc::now(),
                    });
                }
            } else if self.active.remove(&kind) {
                tracing::info!(kind = %kind, value = %value, "Risk alert cleared");
            }
        }
        alerts
    }
}

fn breached(kind: AlertKind, value: Decimal, threshold: Decimal) -> bool {
    match kind {
        // Leverage at exactly the cap is allowed by the limit checks
        AlertKind::Leverage => value > threshold,
        AlertKind::Drawdown | AlertKind::ValueAtRisk => value >= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(drawdown: Decimal, var: Option<Decimal>, leverage: Decimal) -> RiskSnapshot {
        RiskSnapshot {
            timestamp: Utc::now(),
            portfolio_version: 1,
            equity: dec!(100000),
            current_drawdown: drawdown,
            value_at_risk: var,
            value_at_risk_amount: None,
            correlation_matrix: None,
            leverage: Some(leverage),
            status: SnapshotStatus::Fresh,
            age_ms: 0,
            generation: 1,
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            var_limit: Some(dec!(0.05)),
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn test_drawdown_alert_once_per_episode() {
        let mut tracker = AlertTracker::new();
        let limits = RiskLimits::default();

        // 0.8 * 0.20 = 0.16
        let alerts = tracker.evaluate(&snapshot(dec!(0.17), None, dec!(1)), &limits, &config());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Drawdown);
        assert_eq!(alerts[0].threshold, dec!(0.16));

        let again = tracker.evaluate(&snapshot(dec!(0.18), None, dec!(1)), &limits, &config());
        assert!(again.is_empty());

        // Recovery ends the episode, next breach alerts again
        assert!(tracker
            .evaluate(&snapshot(dec!(0.05), None, dec!(1)), &limits, &config())
            .is_empty());
        assert!(!tracker.is_active(AlertKind::Drawdown));
        let next = tracker.evaluate(&snapshot(dec!(0.16), None, dec!(1)), &limits, &config());
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_var_and_leverage_alerts() {
        let mut tracker = AlertTracker::new();
        let limits = RiskLimits::default();

        let alerts = tracker.evaluate(
            &snapshot(dec!(0), Some(dec!(0.06)), dec!(2.5)),
            &limits,
            &config(),
        );
        let kinds: Vec<_> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::ValueAtRisk, AlertKind::Leverage]);
    }

    #[test]
    fn test_missing_var_keeps_episode() {
        let mut tracker = AlertTracker::new();
        let limits = RiskLimits::default();

        tracker.evaluate(&snapshot(dec!(0), Some(dec!(0.06)), dec!(1)), &limits, &config());
        assert!(tracker.is_active(AlertKind::ValueAtRisk));
        tracker.evaluate(&snapshot(dec!(0), None, dec!(1)), &limits, &config());
        assert!(tracker.is_active(AlertKind::ValueAtRisk));
    }

    #[test]
    fn test_stale_snapshot_ignored() {
        let mut tracker = AlertTracker::new();
        let limits = RiskLimits::default();
        let mut stale = snapshot(dec!(0.5), None, dec!(1));
        stale.status = SnapshotStatus::Stale;

        assert!(tracker.evaluate(&stale, &limits, &config()).is_empty());
        assert!(!tracker.is_active(AlertKind::Drawdown));
    }

    #[test]
    fn test_no_var_limit_no_var_alert() {
        let mut tracker = AlertTracker::new();
        let alerts = tracker.evaluate(
            &snapshot(dec!(0), Some(dec!(0.5)), dec!(1)),
            &RiskLimits::default(),
            &MonitorConfig::default(),
        );
        assert!(alerts.is_empty());
    }
}
