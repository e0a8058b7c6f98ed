//! Momentum and rate-of-change variants over a fixed lag.

use crate::indicators::rolling::shift;

/// close[t] - close[t - period]
pub fn momentum(closes: &[f64], period: usize) -> Vec<f64> {
    closes
        .iter()
        .zip(shift(closes, period))
        .map(|(c, prev)| c - prev)
        .collect()
}

/// Percentage change × 100.
pub fn roc(closes: &[f64], period: usize) -> Vec<f64> {
    rocr(closes, period).iter().map(|r| (r - 1.0) * 100.0).collect()
}

/// Fractional change.
pub fn rocp(closes: &[f64], period: usize) -> Vec<f64> {
    rocr(closes, period).iter().map(|r| r - 1.0).collect()
}

/// Ratio to the lagged value; NaN where the lagged value is zero.
pub fn rocr(closes: &[f64], period: usize) -> Vec<f64> {
    closes
        .iter()
        .zip(shift(closes, period))
        .map(|(c, prev)| if prev == 0.0 { f64::NAN } else { c / prev })
        .collect()
}
