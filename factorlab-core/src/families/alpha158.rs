//! Alpha158-style features: candle shape, normalized prices and rolling
//! statistics over 5/10/20/30/60-day windows.
//!
//! Price features are divided by the current close so they are comparable
//! across symbols. Window features that need a full window are 0.0 until
//! one is available.

use std::ops::Range;

use crate::family::{ColumnSink, FamilyContext, FamilyError, IndicatorFamily};
use crate::indicators::regression::fit_line;
use crate::indicators::rolling::{mean, population_std};
use crate::indicators::{
    rolling_max, rolling_mean, rolling_min, rolling_quantile, rolling_rank_pct, rolling_std,
    safe_div, safe_div_series, shift,
};

pub const WINDOWS: [usize; 5] = [5, 10, 20, 30, 60];

const EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default)]
pub struct Alpha158;

impl IndicatorFamily for Alpha158 {
    fn name(&self) -> &str {
        "Alpha158"
    }

    fn min_rows(&self) -> usize {
        60
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError> {
        let s = ctx.series();
        let (open, high, low, close, volume) =
            (s.opens(), s.highs(), s.lows(), s.closes(), s.volumes());
        let n = close.len();
        let per_row = |f: &dyn Fn(usize) -> f64| -> Vec<f64> { (0..n).map(f).collect() };

        // Candle shape
        sink.emit("ALPHA158_KMID", per_row(&|i| safe_div(close[i] - open[i], open[i], 0.0)))?;
        sink.emit("ALPHA158_KLEN", per_row(&|i| safe_div(high[i] - low[i], open[i], 0.0)))?;
        sink.emit(
            "ALPHA158_KMID2",
            per_row(&|i| safe_div(close[i] - open[i], high[i] - low[i] + EPS, 0.0)),
        )?;
        sink.emit(
            "ALPHA158_KUP",
            per_row(&|i| safe_div(high[i] - open[i].max(close[i]), open[i], 0.0)),
        )?;
        sink.emit(
            "ALPHA158_KUP2",
            per_row(&|i| safe_div(high[i] - open[i].max(close[i]), high[i] - low[i] + EPS, 0.0)),
        )?;
        sink.emit(
            "ALPHA158_KLOW",
            per_row(&|i| safe_div(open[i].min(close[i]) - low[i], open[i], 0.0)),
        )?;
        sink.emit(
            "ALPHA158_KLOW2",
            per_row(&|i| safe_div(open[i].min(close[i]) - low[i], high[i] - low[i] + EPS, 0.0)),
        )?;
        sink.emit(
            "ALPHA158_KSFT",
            per_row(&|i| safe_div(2.0 * close[i] - high[i] - low[i], open[i], 0.0)),
        )?;
        sink.emit(
            "ALPHA158_KSFT2",
            per_row(&|i| safe_div(2.0 * close[i] - high[i] - low[i], high[i] - low[i] + EPS, 0.0)),
        )?;

        // Prices relative to close
        let vwap = vwap(&close, &volume);
        sink.emit("ALPHA158_OPEN0", safe_div_series(&open, &close, 0.0))?;
        sink.emit("ALPHA158_HIGH0", safe_div_series(&high, &close, 0.0))?;
        sink.emit("ALPHA158_LOW0", safe_div_series(&low, &close, 0.0))?;
        sink.emit("ALPHA158_VWAP0", safe_div_series(&vwap, &close, 0.0))?;
        sink.emit(
            "ALPHA158_VOLUME0",
            per_row(&|i| safe_div(volume[i], volume[i] + EPS, 0.0)),
        )?;

        let volume_eps: Vec<f64> = volume.iter().map(|v| v + EPS).collect();
        let log_volume: Vec<f64> = volume.iter().map(|v| (v + 1.0).ln()).collect();

        for d in WINDOWS {
            let lagged = shift(&close, d);
            sink.emit(format!("ALPHA158_ROC{d}"), safe_div_series(&lagged, &close, f64::NAN))?;
            sink.emit(
                format!("ALPHA158_MA{d}"),
                safe_div_series(&rolling_mean(&close, d, 1), &close, 0.0),
            )?;
            let std: Vec<f64> = rolling_std(&close, d, 1)
                .into_iter()
                .map(|v| if v.is_nan() { 0.0 } else { v })
                .collect();
            sink.emit(format!("ALPHA158_STD{d}"), safe_div_series(&std, &close, 0.0))?;

            let fits: Vec<Option<_>> = trailing_ranges(n, d)
                .map(|r| r.and_then(|r| fit_line(&close[r])))
                .collect();
            let beta = fits.iter().map(|f| f.map_or(0.0, |f| f.slope)).collect::<Vec<_>>();
            sink.emit(format!("ALPHA158_BETA{d}"), safe_div_series(&beta, &close, 0.0))?;
            sink.emit(
                format!("ALPHA158_RSQR{d}"),
                fits.iter().map(|f| f.map_or(0.0, |f| f.r_squared)).collect(),
            )?;
            let resi: Vec<f64> = fits
                .iter()
                .enumerate()
                .map(|(i, f)| f.map_or(0.0, |f| close[i] - f.endpoint(d)))
                .collect();
            sink.emit(format!("ALPHA158_RESI{d}"), safe_div_series(&resi, &close, 0.0))?;

            let max = rolling_max(&high, d, 1);
            let min = rolling_min(&low, d, 1);
            sink.emit(format!("ALPHA158_MAX{d}"), safe_div_series(&max, &close, 0.0))?;
            sink.emit(format!("ALPHA158_MIN{d}"), safe_div_series(&min, &close, 0.0))?;
            sink.emit(
                format!("ALPHA158_QTLU{d}"),
                safe_div_series(&rolling_quantile(&close, d, 1, 0.8), &close, 0.0),
            )?;
            sink.emit(
                format!("ALPHA158_QTLD{d}"),
                safe_div_series(&rolling_quantile(&close, d, 1, 0.2), &close, 0.0),
            )?;
            sink.emit(format!("ALPHA158_RANK{d}"), rolling_rank_pct(&close, d, 1))?;
            sink.emit(
                format!("ALPHA158_RSV{d}"),
                per_row(&|i| safe_div(close[i] - min[i], max[i] - min[i] + EPS, 0.0)),
            )?;

            let imax = trailing(n, d, |r| (r.len() - 1 - argmax(&high[r.clone()])) as f64 / d as f64);
            let imin = trailing(n, d, |r| (r.len() - 1 - argmin(&low[r.clone()])) as f64 / d as f64);
            let imxd = imax.iter().zip(&imin).map(|(a, b)| a - b).collect();
            sink.emit(format!("ALPHA158_IMAX{d}"), imax)?;
            sink.emit(format!("ALPHA158_IMIN{d}"), imin)?;
            sink.emit(format!("ALPHA158_IMXD{d}"), imxd)?;

            sink.emit(
                format!("ALPHA158_CORR{d}"),
                trailing(n, d, |r| correlation(&close[r.clone()], &log_volume[r])),
            )?;

            let cntp = trailing(n, d, |r| share_of_steps(&close[r], |a, b| b > a));
            let cntn = trailing(n, d, |r| share_of_steps(&close[r], |a, b| b < a));
            let cntd = cntp.iter().zip(&cntn).map(|(p, q)| p - q).collect();
            sink.emit(format!("ALPHA158_CNTP{d}"), cntp)?;
            sink.emit(format!("ALPHA158_CNTN{d}"), cntn)?;
            sink.emit(format!("ALPHA158_CNTD{d}"), cntd)?;

            let sump = trailing(n, d, |r| move_share(&close[r]).0);
            let sumn = trailing(n, d, |r| move_share(&close[r]).1);
            let sumd = sump.iter().zip(&sumn).map(|(p, q)| p - q).collect();
            sink.emit(format!("ALPHA158_SUMP{d}"), sump)?;
            sink.emit(format!("ALPHA158_SUMN{d}"), sumn)?;
            sink.emit(format!("ALPHA158_SUMD{d}"), sumd)?;

            sink.emit(
                format!("ALPHA158_VMA{d}"),
                safe_div_series(&rolling_mean(&volume, d, 1), &volume_eps, 0.0),
            )?;
            let vstd: Vec<f64> = rolling_std(&volume, d, 1)
                .into_iter()
                .map(|v| if v.is_nan() { 0.0 } else { v })
                .collect();
            sink.emit(format!("ALPHA158_VSTD{d}"), safe_div_series(&vstd, &volume_eps, 0.0))?;
        }
        Ok(())
    }
}

/// Volume-weighted price per bar; equals close wherever volume is non-zero.
fn vwap(close: &[f64], volume: &[f64]) -> Vec<f64> {
    close
        .iter()
        .zip(volume)
        .map(|(c, v)| safe_div(c * v, *v, 0.0))
        .collect()
}

/// Full trailing window index range ending at each row, if there is one.
fn trailing_ranges(n: usize, d: usize) -> impl Iterator<Item = Option<Range<usize>>> {
    (0..n).map(move |i| (d > 0 && i + 1 >= d).then(|| i + 1 - d..i + 1))
}

/// Apply `f` to each full trailing window; 0.0 before the first.
fn trailing<F>(n: usize, d: usize, f: F) -> Vec<f64>
where
    F: Fn(Range<usize>) -> f64,
{
    trailing_ranges(n, d).map(|r| r.map_or(0.0, &f)).collect()
}

// Latest index of the maximum.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v >= values[best] {
            best = i;
        }
    }
    best
}

fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v <= values[best] {
            best = i;
        }
    }
    best
}

/// Fraction of consecutive steps satisfying `pred(prev, next)`.
fn share_of_steps(values: &[f64], pred: impl Fn(f64, f64) -> bool) -> f64 {
    let steps = values.len().saturating_sub(1);
    if steps == 0 {
        return 0.0;
    }
    let hits = values.windows(2).filter(|w| pred(w[0], w[1])).count();
    hits as f64 / steps as f64
}

/// (up share, down share) of total absolute movement.
fn move_share(values: &[f64]) -> (f64, f64) {
    let mut up = 0.0;
    let mut down = 0.0;
    for w in values.windows(2) {
        let ch = w[1] - w[0];
        if ch > 0.0 {
            up += ch;
        } else {
            down -= ch;
        }
    }
    let total = up + down + EPS;
    (up / total, down / total)
}

/// Pearson correlation; 0.0 when either side is flat.
fn correlation(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || population_std(x) <= 1e-8 || population_std(y) <= 1e-8 {
        return 0.0;
    }
    let (mx, my) = (mean(x), mean(y));
    let cov: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let vx: f64 = x.iter().map(|a| (a - mx) * (a - mx)).sum();
    let vy: f64 = y.iter().map(|b| (b - my) * (b - my)).sum();
    cov / (vx * vy).sqrt()
}
