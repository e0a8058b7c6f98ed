//! Alpha360: the last 60 days of raw prices and volume, normalized by the
//! current close (prices) or current volume (volume).
//!
//! `ALPHA360_CLOSE{k}` is close[t-k] / close[t]. Lags reaching before the
//! first row are NaN.

use crate::family::{ColumnSink, FamilyContext, FamilyError, IndicatorFamily};
use crate::indicators::{safe_div, safe_div_series, shift};

pub const LAGS: usize = 60;

#[derive(Debug, Clone, Copy, Default)]
pub struct Alpha360;

impl IndicatorFamily for Alpha360 {
    fn name(&self) -> &str {
        "Alpha360"
    }

    fn min_rows(&self) -> usize {
        LAGS
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError> {
        let s = ctx.series();
        let close = s.closes();
        let volume = s.volumes();
        let vwap: Vec<f64> = close
            .iter()
            .zip(&volume)
            .map(|(c, v)| safe_div(c * v, *v, 0.0))
            .collect();
        let volume_eps: Vec<f64> = volume.iter().map(|v| v + 1e-12).collect();

        let prices = [
            ("CLOSE", close.clone()),
            ("OPEN", s.opens()),
            ("HIGH", s.highs()),
            ("LOW", s.lows()),
            ("VWAP", vwap),
        ];
        for (stem, values) in &prices {
            for k in (0..LAGS).rev() {
                let lagged = shift(values, k);
                sink.emit(
                    format!("ALPHA360_{stem}{k}"),
                    safe_div_series(&lagged, &close, f64::NAN),
                )?;
            }
        }
        for k in (0..LAGS).rev() {
            let lagged = shift(&volume, k);
            sink.emit(
                format!("ALPHA360_VOLUME{k}"),
                safe_div_series(&lagged, &volume_eps, f64::NAN),
            )?;
        }
        Ok(())
    }
}
