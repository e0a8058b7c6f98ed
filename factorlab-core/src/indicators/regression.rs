//! Least-squares line fits over trailing windows (x = 0, 1, ..., n-1).

/// Slope, intercept and R² of `y` against its index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LineFit {
    /// Fitted value at the last point of the window.
    pub fn endpoint(&self, n: usize) -> f64 {
        self.intercept + self.slope * (n as f64 - 1.0)
    }
}

/// Fit `y`; `None` for fewer than two points.
pub fn fit_line(y: &[f64]) -> Option<LineFit> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / nf;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (i, &v) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = v - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let slope = sxy / sxx;
    let r_squared = if syy == 0.0 { 0.0 } else { (sxy * sxy) / (sxx * syy) };
    Some(LineFit {
        slope,
        intercept: y_mean - slope * x_mean,
        r_squared,
    })
}

/// Slope of each full trailing window; NaN before the first.
pub fn rolling_slope(values: &[f64], window: usize) -> Vec<f64> {
    rolling_fit(values, window, |fit, _| fit.slope)
}

/// Fitted value at the end of each full trailing window.
pub fn linear_regression(values: &[f64], window: usize) -> Vec<f64> {
    rolling_fit(values, window, |fit, n| fit.endpoint(n))
}

fn rolling_fit<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&LineFit, usize) -> f64,
{
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window < 2 || n < window {
        return result;
    }
    for i in (window - 1)..n {
        let y = &values[i + 1 - window..=i];
        if y.iter().any(|v| v.is_nan()) {
            continue;
        }
        if let Some(fit) = fit_line(y) {
            result[i] = f(&fit, window);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn perfect_line() {
        let fit = fit_line(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert_approx(fit.slope, 2.0, DEFAULT_EPSILON);
        assert_approx(fit.intercept, 1.0, DEFAULT_EPSILON);
        assert_approx(fit.r_squared, 1.0, DEFAULT_EPSILON);
        assert_approx(fit.endpoint(4), 7.0, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_line_has_zero_r_squared() {
        let fit = fit_line(&[4.0; 5]).unwrap();
        assert_approx(fit.slope, 0.0, DEFAULT_EPSILON);
        assert_approx(fit.r_squared, 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_slope_windows() {
        let r = rolling_slope(&[1.0, 2.0, 4.0, 8.0], 2);
        assert!(r[0].is_nan());
        assert_eq!(&r[1..], &[1.0, 2.0, 4.0]);
        assert!(fit_line(&[1.0]).is_none());
    }
}
