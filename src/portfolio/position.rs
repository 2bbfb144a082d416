//! Position tracking

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open position in one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol
    pub symbol: String,
    /// Signed quantity (negative = short)
    pub quantity: Decimal,
    /// Average entry price of the open quantity
    pub entry_price: Decimal,
    /// Latest mark price
    pub current_price: Decimal,
    /// P&L realized by reducing this position
    pub realized_pnl: Decimal,
    /// Mark-to-market P&L of the open quantity
    pub unrealized_pnl: Decimal,
    /// When the position was opened
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Open a new position at a price
    pub fn open(
        symbol: impl Into<String>,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            entry_price: price,
            current_price: price,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            opened_at: timestamp,
        }
    }

    /// Signed market value
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.current_price
    }

    /// Absolute notional exposure
    pub fn exposure(&self) -> Decimal {
        self.market_value().abs()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Update mark-to-market
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = (price - self.entry_price) * self.quantity;
    }

    /// Apply a signed fill and return the P&L it realized
    ///
    /// Adding to the position averages the entry price; trading against it
    /// realizes P&L on the closed quantity; crossing through zero re-opens
    /// the remainder at the fill price.
    pub fn apply_fill(&mut self, quantity: Decimal, price: Decimal) -> Decimal {
        let mut realized = Decimal::ZERO;
        let old = self.quantity;
        let new = old + quantity;

        if old.is_zero() || old.is_sign_positive() == quantity.is_sign_positive() {
            let total = new.abs();
            if !total.is_zero() {
                self.entry_price =
                    (self.entry_price * old.abs() + price * quantity.abs()) / total;
            }
        } else {
            let closed = quantity.abs().min(old.abs());
            let closed_signed = if old.is_sign_positive() { closed } else { -closed };
            realized = (price - self.entry_price) * closed_signed;

            if !new.is_zero() && new.is_sign_positive() != old.is_sign_positive() {
                self.entry_price = price;
            }
        }

        self.quantity = new;
        self.realized_pnl += realized;
        self.mark(price);
        realized
    }
}
