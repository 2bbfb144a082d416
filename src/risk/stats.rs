//! Return-series statistics
//!
//! Plain f64 math over return windows, converted to `Decimal` at the edges
//! the same way the volatility estimator does.

use rust_decimal::Decimal;

/// Simple returns from consecutive prices, skipping non-positive prices
pub fn simple_returns(prices: &[Decimal]) -> Vec<f64> {
    let valid: Vec<f64> = prices
        .iter()
        .filter(|p| **p > Decimal::ZERO)
        .filter_map(|p| f64::try_from(*p).ok())
        .collect();

    valid.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation; None below two observations
pub fn std_dev(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

/// Pearson correlation of two equal-length windows
///
/// None when the windows differ in length, are shorter than two, or either
/// has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a);
    let mb = mean(b);

    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }

    if va <= f64::EPSILON || vb <= f64::EPSILON {
        return None;
    }
    Some((cov / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0))
}

/// Historical-simulation VaR as a non-negative loss fraction
///
/// Sorts the returns ascending and takes the (1 - confidence) percentile.
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let idx = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    Some((-sorted[idx]).max(0.0))
}

/// Convert a statistic to `Decimal`, rounded for stable comparisons
pub fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok().map(|d| d.round_dp(10))
}
