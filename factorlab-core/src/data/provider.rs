//! Series source trait and structured error types.
//!
//! The `SeriesSource` trait abstracts over where raw OHLCV history lives
//! (a qlib binary store, an in-memory map, a synthetic generator) so the
//! orchestrator can swap implementations and tests can inject fixtures.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::RawSeries;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no rows for symbol '{symbol}'")]
    Empty { symbol: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("malformed {what}: {detail}")]
    Malformed { what: String, detail: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl DataError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// True for the explicit "this symbol has no data" signals.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SymbolNotFound { .. } | Self::Empty { .. })
    }
}

/// Provider of aligned daily OHLCV history.
///
/// Implementations must be callable from many worker threads at once.
pub trait SeriesSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the full aligned history for one symbol.
    fn fetch(&self, symbol: &str) -> Result<RawSeries, DataError>;

    /// Enumerate the universe. An empty list is a valid answer.
    fn list_symbols(&self) -> Result<Vec<String>, DataError>;
}

/// In-memory source keyed by upper-case symbol.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: BTreeMap<String, RawSeries>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: RawSeries) {
        self.series
            .insert(series.symbol().to_uppercase(), series);
    }

    pub fn with(mut self, series: RawSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl SeriesSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, symbol: &str) -> Result<RawSeries, DataError> {
        let series = self
            .series
            .get(&symbol.to_uppercase())
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;
        if series.is_empty() {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
            });
        }
        Ok(series.clone())
    }

    fn list_symbols(&self) -> Result<Vec<String>, DataError> {
        Ok(self.series.keys().cloned().collect())
    }
}
