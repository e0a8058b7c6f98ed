//! Bar and RawSeries: the per-symbol daily OHLCV history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::DataError;

/// OHLCV bar for a single symbol on a single trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Replace every non-finite field with the 0.0 sentinel.
    pub fn sanitized(self) -> Self {
        fn clean(v: f64) -> f64 {
            if v.is_finite() {
                v
            } else {
                0.0
            }
        }
        Self {
            date: self.date,
            open: clean(self.open),
            high: clean(self.high),
            low: clean(self.low),
            close: clean(self.close),
            volume: clean(self.volume),
        }
    }

    /// Basic OHLC sanity check: high >= low and both bracket open/close.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Ordered, validated daily history for one symbol.
///
/// Dates are strictly increasing and every numeric field is finite.
/// Once built the series is never mutated; tasks share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl RawSeries {
    /// Build a series, sanitizing non-finite values and rejecting
    /// duplicate or out-of-order dates.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, DataError> {
        let symbol = symbol.into();
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(DataError::Validation(format!(
                    "{symbol}: dates not strictly increasing at {} -> {}",
                    pair[0].date, pair[1].date
                )));
            }
        }
        let bars = bars.into_iter().map(Bar::sanitized).collect();
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn non_finite_fields_become_zero() {
        let mut b = bar(2, 100.0);
        b.close = f64::NAN;
        b.volume = f64::INFINITY;
        let series = RawSeries::new("SPY", vec![b]).unwrap();
        assert_eq!(series.bars()[0].close, 0.0);
        assert_eq!(series.bars()[0].volume, 0.0);
        assert_eq!(series.bars()[0].open, 100.0);
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = RawSeries::new("SPY", vec![bar(2, 1.0), bar(2, 2.0)]).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn rejects_descending_dates() {
        assert!(RawSeries::new("SPY", vec![bar(3, 1.0), bar(2, 2.0)]).is_err());
    }

    #[test]
    fn column_accessors_follow_bar_order() {
        let series = RawSeries::new("SPY", vec![bar(2, 10.0), bar(3, 11.0)]).unwrap();
        assert_eq!(series.closes(), vec![10.0, 11.0]);
        assert_eq!(series.highs(), vec![11.0, 12.0]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.symbol(), "SPY");
    }

    #[test]
    fn sane_bar() {
        assert!(bar(2, 100.0).is_sane());
        let mut b = bar(2, 100.0);
        b.high = 90.0;
        assert!(!b.is_sane());
    }
}
