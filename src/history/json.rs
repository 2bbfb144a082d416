//! JSON price history files

use super::ReturnHistoryProvider;
use crate::risk::stats;
use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;

/// Price history loaded from `{ "SYMBOL": [price, ...] }`, oldest first
#[derive(Debug, Clone, Default)]
pub struct JsonHistoryFile {
    returns: BTreeMap<String, Vec<f64>>,
}

impl JsonHistoryFile {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read history file {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse history file {}", path.display()))
    }

    /// Parse prices and convert them to simple returns
    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let prices: BTreeMap<String, Vec<Decimal>> = serde_json::from_str(content)?;

        let returns = prices
            .into_iter()
            .map(|(symbol, series)| {
                let skipped = series.iter().filter(|p| **p <= Decimal::ZERO).count();
                if skipped > 0 {
                    tracing::warn!(symbol = %symbol, skipped, "Skipping non-positive prices");
                }
                (symbol, stats::simple_returns(&series))
            })
            .collect();

        Ok(Self { returns })
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

#[async_trait]
impl ReturnHistoryProvider for JsonHistoryFile {
    async fn symbols(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.returns.keys().cloned().collect())
    }

    async fn returns(&self, symbol: &str, limit: usize) -> anyhow::Result<Vec<f64>> {
        let series = self
            .returns
            .get(symbol)
            .ok_or_else(|| anyhow::anyhow!("No history for {}", symbol))?;
        let start = series.len().saturating_sub(limit);
        Ok(series[start..].to_vec())
    }
}
