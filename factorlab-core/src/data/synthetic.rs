//! Deterministic synthetic series for demos and benchmarks.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, SeriesSource};
use crate::domain::{Bar, RawSeries};

/// Random-walk bars seeded from the symbol name, so the same symbol always
/// yields the same history.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    symbols: Vec<String>,
    rows: usize,
    start: NaiveDate,
}

impl SyntheticSource {
    pub fn new(symbols: Vec<String>, rows: usize) -> Self {
        Self {
            symbols: symbols.into_iter().map(|s| s.to_uppercase()).collect(),
            rows,
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
        }
    }

    /// `count` symbols named `SYN000`, `SYN001`, ...
    pub fn numbered(count: usize, rows: usize) -> Self {
        Self::new((0..count).map(|i| format!("SYN{i:03}")).collect(), rows)
    }

    pub fn starting(mut self, start: NaiveDate) -> Self {
        self.start = start;
        self
    }
}

impl SeriesSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, symbol: &str) -> Result<RawSeries, DataError> {
        let symbol = symbol.to_uppercase();
        if !self.symbols.contains(&symbol) {
            return Err(DataError::SymbolNotFound { symbol });
        }
        let bars = generate_bars(&symbol, self.start, self.rows);
        RawSeries::new(symbol, bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, DataError> {
        let mut symbols = self.symbols.clone();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

/// `rows` weekday bars starting on or after `start`.
pub fn generate_bars(symbol: &str, start: NaiveDate, rows: usize) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(rows);
    let mut price = 100.0_f64;
    let mut current = start;
    while bars.len() < rows {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += Duration::days(1);
            continue;
        }
        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64) as f64;
        bars.push(Bar {
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
        current += Duration::days(1);
    }
    bars
}
