//! Relative Strength Index (Wilder smoothing of gains and losses).

/// RSI of `closes`; first value at index `period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let ch = closes[i] - closes[i - 1];
        if ch.is_nan() {
            return result;
        }
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_value(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let ch = closes[i] - closes[i - 1];
        if ch.is_nan() {
            return result;
        }
        avg_gain = alpha * ch.max(0.0) + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * avg_loss;
        result[i] = rsi_value(avg_gain, avg_loss);
    }
    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
