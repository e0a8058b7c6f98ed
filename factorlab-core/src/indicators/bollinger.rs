//! Bollinger bands: SMA ± k × population standard deviation.

use crate::indicators::rolling::{population_std, rolling_mean, window_apply};

#[derive(Debug, Clone)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Bands {
    let middle = rolling_mean(closes, period, period);
    let std = window_apply(closes, period, period, population_std);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + k * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - k * s).collect();
    Bands {
        upper,
        middle,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn constant_price_has_zero_width() {
        let b = bollinger(&[10.0; 25], 20, 2.0);
        assert!(b.middle[18].is_nan());
        assert_approx(b.upper[24], 10.0, DEFAULT_EPSILON);
        assert_approx(b.lower[24], 10.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bands_symmetric_around_middle() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let b = bollinger(&closes, 20, 2.0);
        for i in 19..30 {
            assert_approx(b.upper[i] - b.middle[i], b.middle[i] - b.lower[i], 1e-9);
        }
    }
}
