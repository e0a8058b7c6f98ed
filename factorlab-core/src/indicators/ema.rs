//! Exponential and weighted moving averages.
//!
//! EMA: alpha = 2 / (period + 1), seeded with the SMA of the first `period`
//! valid values. Leading NaNs (e.g. the warm-up of another indicator) are
//! skipped, so EMAs can be chained.

/// EMA of `values`, NaN until the seed window is complete.
///
/// A NaN after the seed poisons the rest of the series.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }
    let Some(first) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    let seed_end = first + period;
    if seed_end > n {
        return result;
    }

    let mut sum = 0.0;
    for &v in &values[first..seed_end] {
        if v.is_nan() {
            return result;
        }
        sum += v;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = sum / period as f64;
    result[seed_end - 1] = prev;

    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Linearly weighted moving average; the newest value has weight `period`.
pub fn wma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    let denom = (period * (period + 1)) as f64 / 2.0;
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(j, v)| (j + 1) as f64 * v)
            .sum();
        result[i] = weighted / denom;
    }
    result
}
