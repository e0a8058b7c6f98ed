//! Qlib-layout binary store.
//!
//! Layout under the data directory:
//!
//! ```text
//! calendars/day.txt                 one ISO date per line, ascending
//! features/<symbol>/open.day.bin    little-endian f32 values
//! features/<symbol>/high.day.bin
//! ...
//! ```
//!
//! Symbol directories are lower-case on disk; the store reports them
//! upper-case.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::{debug, warn};

use super::provider::{DataError, SeriesSource};
use crate::domain::{Bar, RawSeries};

/// Field files every symbol directory must contain.
pub const FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Anchor for synthesized dates when no calendar is available.
pub fn default_last_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 27).unwrap_or_default()
}

/// Read-only view over a qlib data directory.
#[derive(Debug, Clone)]
pub struct QlibStore {
    root: PathBuf,
}

impl QlibStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn features_dir(&self) -> PathBuf {
        self.root.join("features")
    }

    fn calendar_path(&self) -> PathBuf {
        self.root.join("calendars").join("day.txt")
    }

    /// Dates for a series of `len` rows: the tail of the calendar when it
    /// is long enough, otherwise business days ending on its last entry.
    fn dates_for(&self, len: usize) -> Result<Vec<NaiveDate>, DataError> {
        let calendar = self.read_calendar()?;
        if !calendar.is_empty() && len <= calendar.len() {
            return Ok(calendar[calendar.len() - len..].to_vec());
        }
        let end = calendar.last().copied().unwrap_or_else(default_last_date);
        debug!(
            rows = len,
            calendar_len = calendar.len(),
            %end,
            "synthesizing business-day index"
        );
        Ok(business_days_ending(end, len))
    }

    fn read_calendar(&self) -> Result<Vec<NaiveDate>, DataError> {
        let path = self.calendar_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path).map_err(|e| DataError::io(&path, e))?;
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| {
                // Calendars sometimes carry a time component.
                let day = l.split_whitespace().next().unwrap_or(l);
                NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| DataError::Malformed {
                    what: path.display().to_string(),
                    detail: format!("bad date '{l}': {e}"),
                })
            })
            .collect()
    }
}

impl SeriesSource for QlibStore {
    fn name(&self) -> &str {
        "qlib"
    }

    fn fetch(&self, symbol: &str) -> Result<RawSeries, DataError> {
        let dir = self.features_dir().join(symbol.to_lowercase());
        if !dir.is_dir() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        let mut fields = Vec::with_capacity(FIELDS.len());
        for field in FIELDS {
            let path = dir.join(format!("{field}.day.bin"));
            if !path.exists() {
                return Err(DataError::Malformed {
                    what: dir.display().to_string(),
                    detail: format!("missing {field}.day.bin"),
                });
            }
            let bytes = fs::read(&path).map_err(|e| DataError::io(&path, e))?;
            fields.push(decode_f32_le(&bytes));
        }

        let len = fields.iter().map(Vec::len).min().unwrap_or(0);
        if fields.iter().any(|f| f.len() != len) {
            warn!(symbol, rows = len, "field files differ in length, truncating");
        }
        if len == 0 {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
            });
        }

        let dates = self.dates_for(len)?;
        let bars = (0..len)
            .map(|i| Bar {
                date: dates[i],
                open: fields[0][i],
                high: fields[1][i],
                low: fields[2][i],
                close: fields[3][i],
                volume: fields[4][i],
            })
            .collect();
        RawSeries::new(symbol.to_uppercase(), bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, DataError> {
        let features = self.features_dir();
        if !features.is_dir() {
            warn!(path = %features.display(), "features directory does not exist");
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&features).map_err(|e| DataError::io(&features, e))?;
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::io(&features, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let complete = FIELDS
                .iter()
                .all(|f| path.join(format!("{f}.day.bin")).exists());
            if complete {
                symbols.push(entry.file_name().to_string_lossy().to_uppercase());
            }
        }
        symbols.sort();
        debug!(count = symbols.len(), "listed qlib symbols");
        Ok(symbols)
    }
}

/// Decode little-endian f32 values; non-finite values become 0.0 and a
/// trailing partial word is ignored.
pub fn decode_f32_le(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(4)
        .map(|c| {
            let v = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            if v.is_finite() {
                v as f64
            } else {
                0.0
            }
        })
        .collect()
}

/// `count` weekdays ending on `end` (or the last weekday before it).
pub fn business_days_ending(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut current = end;
    while days.len() < count {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(current);
        }
        current -= Duration::days(1);
    }
    days.reverse();
    days
}
