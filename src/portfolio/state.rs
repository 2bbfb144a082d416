//! Versioned portfolio state
//!
//! [`PortfolioState`] is owned by the writer task and is the only place
//! positions, cash and price history change. Every mutation commits a new
//! [`PortfolioSnapshot`] version with equity and peak equity recomputed.
//! Published snapshots are never edited; copy-on-write `Arc`s keep the
//! per-version cost proportional to what changed.

use super::Position;
use crate::config::PortfolioConfig;
use crate::feed::PriceTick;
use crate::risk::{stats, RiskError};
use crate::signal::Side;
use crate::telemetry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Equity observation appended on every version
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// Last price and bounded return history for one symbol
#[derive(Debug, Clone, Default)]
pub struct SymbolSeries {
    last_price: Option<Decimal>,
    returns: VecDeque<f64>,
}

impl SymbolSeries {
    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    /// Number of return observations held
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Most recent `n` returns, oldest first; None if fewer are held
    pub fn tail(&self, n: usize) -> Option<Vec<f64>> {
        if n == 0 || self.returns.len() < n {
            return None;
        }
        Some(self.returns.iter().skip(self.returns.len() - n).copied().collect())
    }

    fn push_return(&mut self, value: f64, capacity: usize) {
        self.returns.push_back(value);
        while self.returns.len() > capacity {
            self.returns.pop_front();
        }
    }
}

/// Immutable view of the portfolio at one version
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    /// Monotonic version, bumped by every mutation
    pub version: u64,
    /// Time the version was committed
    pub timestamp: DateTime<Utc>,
    /// Open positions by symbol
    pub positions: BTreeMap<String, Position>,
    pub cash: Decimal,
    /// cash + market value of positions
    pub equity: Decimal,
    /// High-water mark of equity
    pub peak_equity: Decimal,
    /// Realized P&L across closed and reduced positions
    pub realized_pnl: Decimal,
    /// Equity curve, oldest first
    ///
    /// Append-only per version but bounded to `history_capacity` points;
    /// the oldest points are dropped first.
    pub equity_history: Arc<VecDeque<EquityPoint>>,
    /// Price and return history per symbol
    pub market: BTreeMap<String, Arc<SymbolSeries>>,
}

impl PortfolioSnapshot {
    /// Fractional decline of equity from its peak
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.equity) / self.peak_equity).max(Decimal::ZERO)
    }

    /// Sum of absolute position notionals
    pub fn gross_exposure(&self) -> Decimal {
        self.positions.values().map(Position::exposure).sum()
    }

    /// Signed notional held in a symbol
    pub fn exposure(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(Position::market_value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Gross exposure over equity; None when equity is not positive
    pub fn leverage(&self) -> Option<Decimal> {
        if self.equity <= Decimal::ZERO {
            return None;
        }
        Some(self.gross_exposure() / self.equity)
    }

    /// Latest known price for a symbol
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.market.get(symbol).and_then(|s| s.last_price())
    }

    /// Signed quantity worth `fraction` of equity at the last price
    pub fn order_quantity(&self, symbol: &str, side: Side, fraction: Decimal) -> Option<Decimal> {
        let price = self.price(symbol)?;
        Some((fraction * self.equity / price).round_dp(8) * side.sign())
    }

    pub fn series(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.market.get(symbol).map(Arc::as_ref)
    }

    /// Number of return observations held for a symbol
    pub fn history_len(&self, symbol: &str) -> usize {
        self.series(symbol).map(SymbolSeries::len).unwrap_or(0)
    }

    /// Most recent `n` returns for a symbol, or the shortfall as an error
    pub fn returns_tail(&self, symbol: &str, n: usize) -> Result<Vec<f64>, RiskError> {
        self.series(symbol)
            .and_then(|s| s.tail(n))
            .ok_or_else(|| RiskError::InsufficientHistory {
                symbol: symbol.to_string(),
                available: self.history_len(symbol),
                required: n,
            })
    }

    /// Sample volatility of the last `window` returns
    pub fn realized_volatility(&self, symbol: &str, window: usize) -> Option<Decimal> {
        let series = self.series(symbol)?;
        let n = window.min(series.len());
        let tail = series.tail(n)?;
        stats::std_dev(&tail).and_then(stats::to_decimal)
    }
}

/// Writer-owned mutable portfolio
pub struct PortfolioState {
    working: PortfolioSnapshot,
    history_capacity: usize,
    max_tick_move: Decimal,
    applied_signals: HashSet<Uuid>,
    applied_order: VecDeque<Uuid>,
}

impl PortfolioState {
    /// Start from all cash at version 0
    pub fn new(config: &PortfolioConfig) -> Self {
        let now = Utc::now();
        let mut history = VecDeque::with_capacity(config.history_capacity);
        history.push_back(EquityPoint {
            version: 0,
            timestamp: now,
            equity: config.initial_cash,
        });

        Self {
            working: PortfolioSnapshot {
                version: 0,
                timestamp: now,
                positions: BTreeMap::new(),
                cash: config.initial_cash,
                equity: config.initial_cash,
                peak_equity: config.initial_cash,
                realized_pnl: Decimal::ZERO,
                equity_history: Arc::new(history),
                market: BTreeMap::new(),
            },
            history_capacity: config.history_capacity.max(1),
            max_tick_move: config.max_tick_move,
            applied_signals: HashSet::new(),
            applied_order: VecDeque::new(),
        }
    }

    /// The committed state as an immutable snapshot
    pub fn snapshot(&self) -> Arc<PortfolioSnapshot> {
        Arc::new(self.working.clone())
    }

    /// Borrow the committed state without publishing it
    pub fn current(&self) -> &PortfolioSnapshot {
        &self.working
    }

    pub fn version(&self) -> u64 {
        self.working.version
    }

    /// Apply a price tick: extend the return series, re-mark, commit
    ///
    /// A move larger than `max_tick_move` still becomes the new mark, but the
    /// jump is kept out of the return series.
    pub fn apply_price(&mut self, tick: &PriceTick) -> Result<u64, RiskError> {
        if tick.price <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice {
                symbol: tick.symbol.clone(),
                reason: format!("non-positive price {}", tick.price),
            });
        }

        let capacity = self.history_capacity;
        let series = Arc::make_mut(self.working.market.entry(tick.symbol.clone()).or_default());

        if let Some(prev) = series.last_price {
            let change = (tick.price - prev) / prev;
            if change.abs() > self.max_tick_move {
                tracing::warn!(
                    symbol = %tick.symbol,
                    previous = %prev,
                    price = %tick.price,
                    change = %change,
                    "Price gap beyond sanity bound, excluded from returns"
                );
                telemetry::record_price_gap();
            } else if let Some(r) = f64::try_from(change).ok().filter(|r| r.is_finite()) {
                series.push_return(r, capacity);
            }
        }
        series.last_price = Some(tick.price);

        if let Some(position) = self.working.positions.get_mut(&tick.symbol) {
            position.mark(tick.price);
        }

        Ok(self.commit(tick.timestamp))
    }

    /// Seed historical returns from the storage collaborator
    ///
    /// Seeded observations precede anything already recorded live.
    pub fn seed_returns(&mut self, symbol: &str, returns: &[f64]) -> u64 {
        let capacity = self.history_capacity;
        let series = Arc::make_mut(self.working.market.entry(symbol.to_string()).or_default());

        let live: Vec<f64> = series.returns.drain(..).collect();
        for r in returns.iter().chain(live.iter()).filter(|r| r.is_finite()) {
            series.push_return(*r, capacity);
        }

        self.commit(Utc::now())
    }

    /// Whether a signal id has already produced a fill
    pub fn is_applied(&self, signal_id: &Uuid) -> bool {
        self.applied_signals.contains(signal_id)
    }

    /// Fill a signed quantity at a price and commit
    pub fn apply_fill(
        &mut self,
        signal_id: Uuid,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        self.working.cash -= quantity * price;

        let realized = match self.working.positions.get_mut(symbol) {
            Some(position) => position.apply_fill(quantity, price),
            None => {
                self.working.positions.insert(
                    symbol.to_string(),
                    Position::open(symbol, quantity, price, timestamp),
                );
                Decimal::ZERO
            }
        };
        self.working.realized_pnl += realized;

        if self
            .working
            .positions
            .get(symbol)
            .map(Position::is_flat)
            .unwrap_or(false)
        {
            self.working.positions.remove(symbol);
        }

        self.remember_signal(signal_id);
        self.commit(timestamp)
    }

    fn remember_signal(&mut self, id: Uuid) {
        if self.applied_signals.insert(id) {
            self.applied_order.push_back(id);
        }
        while self.applied_order.len() > self.history_capacity {
            if let Some(old) = self.applied_order.pop_front() {
                self.applied_signals.remove(&old);
            }
        }
    }

    /// Recompute equity and peak, append to the equity curve, bump version
    fn commit(&mut self, timestamp: DateTime<Utc>) -> u64 {
        let market_value: Decimal = self
            .working
            .positions
            .values()
            .map(Position::market_value)
            .sum();

        let snapshot = &mut self.working;
        snapshot.equity = snapshot.cash + market_value;
        snapshot.peak_equity = snapshot.peak_equity.max(snapshot.equity);
        snapshot.version += 1;
        snapshot.timestamp = timestamp;

        let history = Arc::make_mut(&mut snapshot.equity_history);
        history.push_back(EquityPoint {
            version: snapshot.version,
            timestamp,
            equity: snapshot.equity,
        });
        while history.len() > self.history_capacity {
            history.pop_front();
        }

        snapshot.version
    }
}
