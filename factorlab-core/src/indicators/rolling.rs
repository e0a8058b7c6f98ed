//! Rolling-window primitives over plain `f64` slices.
//!
//! Missing values are NaN. Windows count only non-NaN observations, and a
//! window with fewer than `min_periods` of them yields NaN.

/// Apply `f` to the non-NaN values of each trailing window.
pub fn window_apply<F>(values: &[f64], window: usize, min_periods: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 {
        return result;
    }
    let mut buf = Vec::with_capacity(window);
    for i in 0..n {
        let start = (i + 1).saturating_sub(window);
        buf.clear();
        buf.extend(values[start..=i].iter().copied().filter(|v| !v.is_nan()));
        if buf.len() >= min_periods.max(1) {
            result[i] = f(&buf);
        }
    }
    result
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). NaN for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Population standard deviation (n).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / values.len() as f64).sqrt()
}

pub fn rolling_mean(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    window_apply(values, window, min_periods, mean)
}

pub fn rolling_sum(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    window_apply(values, window, min_periods, |w| w.iter().sum())
}

pub fn rolling_std(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    window_apply(values, window, min_periods, sample_std)
}

pub fn rolling_max(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    window_apply(values, window, min_periods, |w| {
        w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

pub fn rolling_min(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    window_apply(values, window, min_periods, |w| {
        w.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn rolling_quantile(values: &[f64], window: usize, min_periods: usize, q: f64) -> Vec<f64> {
    window_apply(values, window, min_periods, |w| quantile(w, q))
}

/// Percentile rank of the newest value within its window (average rank for
/// ties), in (0, 1].
pub fn rolling_rank_pct(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    window_apply(values, window, min_periods, |w| {
        let Some(&last) = w.last() else {
            return f64::NAN;
        };
        let below = w.iter().filter(|v| **v < last).count() as f64;
        let equal = w.iter().filter(|v| **v == last).count() as f64;
        (below + (equal + 1.0) / 2.0) / w.len() as f64
    })
}

/// Value `lag` rows earlier; NaN before the series start.
pub fn shift(values: &[f64], lag: usize) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| if i >= lag { values[i - lag] } else { f64::NAN })
        .collect()
}

pub fn diff(values: &[f64], lag: usize) -> Vec<f64> {
    values
        .iter()
        .zip(shift(values, lag))
        .map(|(v, prev)| v - prev)
        .collect()
}

pub fn pct_change(values: &[f64], lag: usize) -> Vec<f64> {
    values
        .iter()
        .zip(shift(values, lag))
        .map(|(v, prev)| if prev == 0.0 { f64::NAN } else { v / prev - 1.0 })
        .collect()
}

/// `a / b`, or `fill` where `|b|` is effectively zero or either side is NaN.
pub fn safe_div(a: f64, b: f64, fill: f64) -> f64 {
    if b.abs() > 1e-12 && !a.is_nan() {
        a / b
    } else {
        fill
    }
}

/// Element-wise `safe_div` over two equal-length series.
pub fn safe_div_series(a: &[f64], b: &[f64], fill: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| safe_div(*x, *y, fill)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rolling_mean_full_window() {
        let r = rolling_mean(&[10.0, 11.0, 12.0, 13.0, 14.0], 3, 3);
        assert!(r[0].is_nan() && r[1].is_nan());
        assert_approx(r[2], 11.0, DEFAULT_EPSILON);
        assert_approx(r[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_mean_min_periods_one() {
        let r = rolling_mean(&[2.0, 4.0, 6.0], 5, 1);
        assert_eq!(r, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn rolling_std_is_sample() {
        let r = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8, 8);
        // Sample std of this classic set: sqrt(32/7)
        assert_approx(r[7], (32.0f64 / 7.0).sqrt(), DEFAULT_EPSILON);
        assert_approx(population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_does_not_count_toward_window() {
        let r = rolling_sum(&[1.0, f64::NAN, 3.0], 3, 2);
        assert!(r[1].is_nan());
        assert_approx(r[2], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn quantile_interpolates() {
        assert_approx(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.8), 4.2, DEFAULT_EPSILON);
        assert_approx(quantile(&[5.0, 1.0], 0.5), 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rank_pct_of_last() {
        let r = rolling_rank_pct(&[1.0, 3.0, 2.0], 3, 1);
        assert_approx(r[0], 1.0, DEFAULT_EPSILON);
        assert_approx(r[1], 1.0, DEFAULT_EPSILON);
        assert_approx(r[2], 2.0 / 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn shift_and_diff() {
        let v = [1.0, 4.0, 9.0];
        let s = shift(&v, 1);
        assert!(s[0].is_nan());
        assert_eq!(&s[1..], &[1.0, 4.0]);
        assert_eq!(&diff(&v, 1)[1..], &[3.0, 5.0]);
        assert_approx(pct_change(&v, 2)[2], 8.0, DEFAULT_EPSILON);
    }

    #[test]
    fn safe_div_fills_zero_denominator() {
        assert_eq!(safe_div(1.0, 0.0, 0.0), 0.0);
        assert_eq!(safe_div(f64::NAN, 2.0, -1.0), -1.0);
        assert_eq!(safe_div(3.0, 2.0, 0.0), 1.5);
    }
}
