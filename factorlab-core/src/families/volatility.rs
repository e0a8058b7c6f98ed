//! Annualized volatility of close-to-close moves.

use crate::family::{ColumnSink, FamilyContext, FamilyError, IndicatorFamily};
use crate::indicators::{diff, rolling_std};

const TRADING_DAYS: f64 = 252.0;
const WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct Volatility;

impl IndicatorFamily for Volatility {
    fn name(&self) -> &str {
        "Volatility"
    }

    fn min_rows(&self) -> usize {
        2
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError> {
        let close = ctx.series().closes();
        let moves = diff(&close, 1);
        let log_returns: Vec<f64> = close
            .iter()
            .enumerate()
            .map(|(i, c)| match i {
                0 => f64::NAN,
                _ if close[i - 1] > 0.0 && *c > 0.0 => (c / close[i - 1]).ln(),
                _ => f64::NAN,
            })
            .collect();

        sink.emit("RealizedVolatility_20", annualized_std(&moves, WINDOW))?;
        sink.emit(
            "NegativeSemiDeviation_20",
            semi_deviation(&moves, WINDOW, |m| m < 0.0),
        )?;
        sink.emit("ContinuousVolatility_20", annualized_std(&log_returns, WINDOW))?;
        sink.emit(
            "PositiveSemiDeviation_20",
            semi_deviation(&moves, WINDOW, |m| m > 0.0),
        )?;
        for window in [10, 30, 60] {
            sink.emit(format!("Volatility_{window}"), annualized_std(&moves, window))?;
        }
        Ok(())
    }
}

fn annualized_std(values: &[f64], window: usize) -> Vec<f64> {
    let scale = TRADING_DAYS.sqrt();
    rolling_std(values, window, window)
        .into_iter()
        .map(|v| v * scale)
        .collect()
}

/// Rolling std over only the moves selected by `keep`, counted in selected
/// observations. Values land on the selected days; other days are NaN.
fn semi_deviation(moves: &[f64], window: usize, keep: impl Fn(f64) -> bool) -> Vec<f64> {
    let picked: Vec<usize> = (0..moves.len()).filter(|&i| keep(moves[i])).collect();
    let subset: Vec<f64> = picked.iter().map(|&i| moves[i]).collect();
    let mut out = vec![f64::NAN; moves.len()];
    for (i, v) in picked.into_iter().zip(annualized_std(&subset, window)) {
        out[i] = v;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_series, DEFAULT_EPSILON};
    use crate::registry::IndicatorRegistry;
    use std::sync::Arc;

    #[test]
    fn constant_moves_have_zero_volatility() {
        let moves: Vec<f64> = std::iter::once(f64::NAN).chain(std::iter::repeat(1.0).take(30)).collect();
        let vol = annualized_std(&moves, 10);
        assert!(vol[9].is_nan());
        assert_approx(vol[10], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn semi_deviation_is_nan_off_side() {
        let moves: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { -(i as f64) } else { i as f64 }).collect();
        let neg = semi_deviation(&moves, 3, |m| m < 0.0);
        // Odd rows are positive moves.
        assert!(neg.iter().skip(1).step_by(2).all(|v| v.is_nan()));
        // Negative moves sit on rows 2, 4, 6; the third one fills the window.
        assert!(neg[4].is_nan());
        assert!(neg[6].is_finite());
    }

    #[test]
    fn emits_seven_columns() {
        let ctx = FamilyContext::new(Arc::new(make_series("VOL", 80)));
        let reg = IndicatorRegistry::new();
        let table = crate::family::evaluate(&Volatility, &ctx, &reg).unwrap();
        assert_eq!(table.width(), 7);
        assert_eq!(table.rows(), 80);
        let realized = table.column("RealizedVolatility_20").unwrap();
        assert!(realized[19].is_nan());
        assert!(realized[20].is_finite());
    }
}
