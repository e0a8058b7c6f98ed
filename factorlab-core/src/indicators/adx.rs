//! Directional movement: +DM/-DM, +DI/-DI, DX and ADX (Wilder).

use crate::indicators::atr::{true_range, wilder_smooth};

/// Raw +DM and -DM; index 0 is NaN.
pub fn directional_movement(high: &[f64], low: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = high.len().min(low.len());
    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }
    (plus_dm, minus_dm)
}

/// Directional indicator lines and ADX for one period.
#[derive(Debug, Clone)]
pub struct Directional {
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
    pub dx: Vec<f64>,
    pub adx: Vec<f64>,
}

pub fn directional(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Directional {
    let n = high.len().min(low.len()).min(close.len());
    let (plus_dm, minus_dm) = directional_movement(high, low);
    let smooth_tr = wilder_smooth(&true_range(high, low, close), period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let mut plus_di = vec![f64::NAN; n];
    let mut minus_di = vec![f64::NAN; n];
    let mut dx = vec![f64::NAN; n];
    for i in 0..n {
        let tr = smooth_tr[i];
        if tr.is_nan() || smooth_plus[i].is_nan() || smooth_minus[i].is_nan() || tr == 0.0 {
            continue;
        }
        plus_di[i] = 100.0 * smooth_plus[i] / tr;
        minus_di[i] = 100.0 * smooth_minus[i] / tr;
        let sum = plus_di[i] + minus_di[i];
        dx[i] = if sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di[i] - minus_di[i]).abs() / sum
        };
    }
    let adx = wilder_smooth(&dx, period);
    Directional {
        plus_di,
        minus_di,
        dx,
        adx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_takes_dominant_move() {
        let (p, m) = directional_movement(&[10.0, 12.0, 11.0], &[9.0, 10.0, 7.0]);
        assert!(p[0].is_nan());
        assert_eq!(p[1], 2.0);
        assert_eq!(m[1], 0.0);
        assert_eq!(p[2], 0.0);
        assert_eq!(m[2], 3.0);
    }

    #[test]
    fn adx_bounded() {
        let high: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + 2.0).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 4.0).collect();
        let close: Vec<f64> = high.iter().map(|h| h - 1.5).collect();
        let d = directional(&high, &low, &close, 14);
        let valid: Vec<f64> = d.adx.iter().copied().filter(|v| !v.is_nan()).collect();
        assert!(!valid.is_empty());
        assert!(valid.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn steady_uptrend_has_plus_di_above_minus_di() {
        let high: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 2.0).collect();
        let close: Vec<f64> = high.iter().map(|h| h - 0.5).collect();
        let d = directional(&high, &low, &close, 14);
        assert!(d.plus_di[39] > d.minus_di[39]);
    }
}
