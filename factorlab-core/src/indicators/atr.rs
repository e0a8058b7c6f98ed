//! True range and Wilder smoothing.

/// TR[0] = high[0] - low[0].
/// TR[t] = max(high-low, |high - prev_close|, |low - prev_close|).
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut tr = vec![f64::NAN; n];
    if n == 0 {
        return tr;
    }
    tr[0] = high[0] - low[0];
    for i in 1..n {
        let (h, l, pc) = (high[i], low[i], close[i - 1]);
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    tr
}

/// Wilder smoothing, alpha = 1/period.
///
/// Seeded with the mean of the first `period` consecutive valid values;
/// output is NaN before the seed and after any later NaN.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let seed_start = (0..=n - period).find(|&i| values[i..i + period].iter().all(|v| !v.is_nan()));
    let Some(seed_start) = seed_start else {
        return result;
    };
    let seed_end = seed_start + period;
    let mut prev = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Average true range.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    wilder_smooth(&true_range(high, low, close), period)
}
