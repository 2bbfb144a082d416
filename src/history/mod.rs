//! Return history from the storage collaborator
//!
//! Seeds the portfolio's per-symbol return series at startup so VaR,
//! volatility and correlation have a full window before live ticks arrive.

mod json;

pub use json::JsonHistoryFile;

use crate::portfolio::PortfolioHandle;
use async_trait::async_trait;

/// Source of historical return series keyed by symbol
#[async_trait]
pub trait ReturnHistoryProvider: Send + Sync {
    /// Symbols with stored history
    async fn symbols(&self) -> anyhow::Result<Vec<String>>;

    /// Up to `limit` most recent simple returns, oldest first
    async fn returns(&self, symbol: &str, limit: usize) -> anyhow::Result<Vec<f64>>;
}

/// Seed every symbol the provider knows; returns the number seeded
pub async fn seed_portfolio(
    provider: &dyn ReturnHistoryProvider,
    portfolio: &PortfolioHandle,
    limit: usize,
) -> anyhow::Result<usize> {
    let mut seeded = 0;
    for symbol in provider.symbols().await? {
        let returns = provider.returns(&symbol, limit).await?;
        if returns.is_empty() {
            tracing::warn!(symbol = %symbol, "No usable history");
            continue;
        }
        let count = returns.len();
        portfolio.seed_returns(symbol.as_str(), returns).await?;
        tracing::info!(symbol = %symbol, count, "Seeded return history");
        seeded += 1;
    }
    Ok(seeded)
}
