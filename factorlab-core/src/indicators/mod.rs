//! Series math shared by the built-in indicator families.
//!
//! Everything here works on plain `f64` slices and returns a vector of the
//! same length, NaN-filled during warm-up. Nothing here knows about column
//! names or the registry; the families in `crate::families` do.

pub mod adx;
pub mod aroon;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod momentum;
pub mod regression;
pub mod rolling;
pub mod rsi;

pub use adx::{directional, Directional};
pub use aroon::aroon;
pub use atr::{atr, true_range, wilder_smooth};
pub use bollinger::{bollinger, Bands};
pub use ema::{ema_of_series, wma};
pub use momentum::{momentum, roc, rocp, rocr};
pub use regression::{fit_line, linear_regression, rolling_slope, LineFit};
pub use rolling::{
    diff, pct_change, rolling_max, rolling_mean, rolling_min, rolling_quantile, rolling_rank_pct,
    rolling_std, rolling_sum, safe_div, safe_div_series, shift, window_apply,
};
pub use rsi::rsi;

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high = max(open,close) + 1,
/// low = min(open,close) - 1, volume = 1000 + 10 × index.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0 + 10.0 * i as f64,
            }
        })
        .collect()
}

/// A validated series of `n` bars following a gentle sine-wave drift.
#[cfg(test)]
pub fn make_series(symbol: &str, n: usize) -> crate::domain::RawSeries {
    let closes: Vec<f64> = (0..n)
        .map(|i| 100.0 + 0.1 * i as f64 + 3.0 * (i as f64 * 0.3).sin())
        .collect();
    crate::domain::RawSeries::new(symbol, make_bars(&closes)).unwrap()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
