//! Classic technical-analysis indicators.

use crate::family::{ColumnSink, FamilyContext, FamilyError, IndicatorFamily};
use crate::indicators::rolling::{population_std, window_apply};
use crate::indicators::{
    aroon, atr, bollinger, directional, ema_of_series, momentum, roc, rocp, rocr, rolling_max,
    rolling_mean, rolling_min, rolling_slope, rsi, safe_div, true_range, wma,
};

/// Moving averages, oscillators, trend, volatility, volume and price
/// transforms. Needs 50 rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Technical;

impl IndicatorFamily for Technical {
    fn name(&self) -> &str {
        "Technical"
    }

    fn min_rows(&self) -> usize {
        50
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError> {
        let series = ctx.series();
        let open = series.opens();
        let high = series.highs();
        let low = series.lows();
        let close = series.closes();
        let volume = series.volumes();
        let n = close.len();

        for p in [5, 10, 20, 50] {
            sink.emit(format!("SMA_{p}"), rolling_mean(&close, p, p))?;
        }
        for p in [5, 10, 20, 50] {
            sink.emit(format!("EMA_{p}"), ema_of_series(&close, p))?;
        }
        sink.emit("WMA_20", wma(&close, 20))?;

        // MACD 12/26/9
        let fast = ema_of_series(&close, 12);
        let slow = ema_of_series(&close, 26);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_of_series(&macd, 9);
        let hist: Vec<f64> = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();
        sink.emit("MACD", macd)?;
        sink.emit("MACD_Signal", signal)?;
        sink.emit("MACD_Histogram", hist)?;

        sink.emit("RSI_14", rsi(&close, 14))?;

        let hh = rolling_max(&high, 14, 14);
        let ll = rolling_min(&low, 14, 14);
        let willr = (0..n)
            .map(|i| -100.0 * safe_div(hh[i] - close[i], hh[i] - ll[i], f64::NAN))
            .collect();
        sink.emit("WILLR_14", willr)?;

        let typical: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
        sink.emit("CCI_14", cci(&typical, 14))?;

        let dir = directional(&high, &low, &close, 14);
        sink.emit("ADX_14", dir.adx)?;
        sink.emit("PLUS_DI_14", dir.plus_di)?;
        sink.emit("MINUS_DI_14", dir.minus_di)?;
        sink.emit("DX_14", dir.dx)?;

        let (aroon_down, aroon_up) = aroon(&high, &low, 14);
        let aroon_osc = aroon_up.iter().zip(&aroon_down).map(|(u, d)| u - d).collect();
        sink.emit("AROON_DOWN", aroon_down)?;
        sink.emit("AROON_UP", aroon_up)?;
        sink.emit("AROONOSC_14", aroon_osc)?;

        let bop = (0..n)
            .map(|i| safe_div(close[i] - open[i], high[i] - low[i], 0.0))
            .collect();
        sink.emit("BOP", bop)?;

        sink.emit("MOM_10", momentum(&close, 10))?;
        sink.emit("ROC_10", roc(&close, 10))?;
        sink.emit("ROCP_10", rocp(&close, 10))?;
        sink.emit("ROCR_10", rocr(&close, 10))?;

        let bands = bollinger(&close, 20, 2.0);
        sink.emit("BB_Upper", bands.upper)?;
        sink.emit("BB_Middle", bands.middle)?;
        sink.emit("BB_Lower", bands.lower)?;

        let atr14 = atr(&high, &low, &close, 14);
        let natr = atr14
            .iter()
            .zip(&close)
            .map(|(a, c)| 100.0 * safe_div(*a, *c, f64::NAN))
            .collect();
        sink.emit("ATR_14", atr14)?;
        sink.emit("NATR_14", natr)?;
        sink.emit("TRANGE", true_range(&high, &low, &close))?;

        sink.emit("OBV", obv(&close, &volume))?;
        sink.emit("AD", accumulation_distribution(&high, &low, &close, &volume))?;

        sink.emit(
            "AVGPRICE",
            (0..n).map(|i| (open[i] + high[i] + low[i] + close[i]) / 4.0).collect(),
        )?;
        sink.emit("MEDPRICE", (0..n).map(|i| (high[i] + low[i]) / 2.0).collect())?;
        sink.emit("TYPPRICE", typical)?;
        sink.emit(
            "WCLPRICE",
            (0..n).map(|i| (high[i] + low[i] + 2.0 * close[i]) / 4.0).collect(),
        )?;

        let std30 = window_apply(&close, 30, 30, population_std);
        let var30 = std30.iter().map(|s| s * s).collect();
        sink.emit("STDDEV_30", std30)?;
        sink.emit("VAR_30", var30)?;
        sink.emit("LINEARREG_SLOPE_14", rolling_slope(&close, 14))?;
        Ok(())
    }
}

/// Commodity channel index over the typical price.
fn cci(typical: &[f64], period: usize) -> Vec<f64> {
    let sma = rolling_mean(typical, period, period);
    let mean_dev = window_apply(typical, period, period, |w| {
        let m = w.iter().sum::<f64>() / w.len() as f64;
        w.iter().map(|v| (v - m).abs()).sum::<f64>() / w.len() as f64
    });
    (0..typical.len())
        .map(|i| {
            if mean_dev[i].is_nan() {
                f64::NAN
            } else {
                safe_div(typical[i] - sma[i], 0.015 * mean_dev[i], 0.0)
            }
        })
        .collect()
}

/// On-balance volume, starting from the first bar's volume.
fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(close.len());
    let mut acc = 0.0;
    for i in 0..close.len() {
        if i == 0 {
            acc = volume[0];
        } else if close[i] > close[i - 1] {
            acc += volume[i];
        } else if close[i] < close[i - 1] {
            acc -= volume[i];
        }
        out.push(acc);
    }
    out
}

/// Chaikin accumulation/distribution line.
fn accumulation_distribution(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    (0..close.len())
        .map(|i| {
            let clv = safe_div((close[i] - low[i]) - (high[i] - close[i]), high[i] - low[i], 0.0);
            acc += clv * volume[i];
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::evaluate;
    use crate::indicators::{assert_approx, make_series, DEFAULT_EPSILON};
    use crate::registry::IndicatorRegistry;
    use std::sync::Arc;

    #[test]
    fn emits_full_column_set() {
        let ctx = FamilyContext::new(Arc::new(make_series("T", 80)));
        let reg = IndicatorRegistry::new();
        let table = evaluate(&Technical, &ctx, &reg).unwrap();
        assert_eq!(table.rows(), 80);
        for name in ["SMA_50", "EMA_5", "MACD_Histogram", "RSI_14", "ATR_14", "OBV", "VAR_30"] {
            assert!(table.contains(name), "missing {name}");
        }
        assert!(table.width() >= 40);
    }

    #[test]
    fn rejects_short_history() {
        let ctx = FamilyContext::new(Arc::new(make_series("T", 49)));
        let reg = IndicatorRegistry::new();
        assert!(matches!(
            evaluate(&Technical, &ctx, &reg),
            Err(FamilyError::InsufficientHistory { required: 50, .. })
        ));
    }

    #[test]
    fn obv_accumulates_by_direction() {
        let r = obv(&[1.0, 2.0, 1.5, 1.5], &[10.0, 5.0, 3.0, 7.0]);
        assert_eq!(r, vec![10.0, 15.0, 12.0, 12.0]);
    }

    #[test]
    fn cci_zero_on_flat_series() {
        let r = cci(&[5.0; 20], 14);
        assert_approx(r[19], 0.0, DEFAULT_EPSILON);
        assert!(r[12].is_nan());
    }
}
