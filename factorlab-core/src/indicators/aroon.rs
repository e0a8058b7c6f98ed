//! Aroon up/down: how recently the window's extreme occurred.
//!
//! Window is `period + 1` bars. On ties the most recent extreme counts.

/// (aroon_down, aroon_up), NaN for the first `period` rows.
pub fn aroon(high: &[f64], low: &[f64], period: usize) -> (Vec<f64>, Vec<f64>) {
    let n = high.len().min(low.len());
    let mut down = vec![f64::NAN; n];
    let mut up = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return (down, up);
    }
    for i in period..n {
        let start = i - period;
        let mut max_offset = 0;
        let mut min_offset = 0;
        for j in 0..=period {
            if high[start + j] >= high[start + max_offset] {
                max_offset = j;
            }
            if low[start + j] <= low[start + min_offset] {
                min_offset = j;
            }
        }
        up[i] = 100.0 * max_offset as f64 / period as f64;
        down[i] = 100.0 * min_offset as f64 / period as f64;
    }
    (down, up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn new_high_is_100() {
        let high = [1.0, 2.0, 3.0, 4.0];
        let low = [0.5, 0.4, 0.3, 0.2];
        let (down, up) = aroon(&high, &low, 3);
        assert!(up[2].is_nan());
        assert_approx(up[3], 100.0, DEFAULT_EPSILON);
        assert_approx(down[3], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn old_extreme_decays() {
        let high = [9.0, 1.0, 1.0, 1.0];
        let low = [0.0, 1.0, 1.0, 1.0];
        let (down, up) = aroon(&high, &low, 3);
        assert_approx(up[3], 0.0, DEFAULT_EPSILON);
        assert_approx(down[3], 0.0, DEFAULT_EPSILON);
    }
}
