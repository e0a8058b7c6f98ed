//! Auxiliary financial statement snapshots.
//!
//! A `FinancialStore` answers "what do we know about this symbol's
//! fundamentals" for a given statement kind. Absence is a normal answer:
//! the financial indicator family falls back to estimation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::provider::DataError;

/// Statement kinds the CSV store knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FinancialKind {
    Info,
    Financials,
    BalanceSheet,
    Cashflow,
    Dividends,
    FinancialRatios,
}

impl FinancialKind {
    pub const ALL: [FinancialKind; 6] = [
        Self::Info,
        Self::Financials,
        Self::BalanceSheet,
        Self::Cashflow,
        Self::Dividends,
        Self::FinancialRatios,
    ];

    /// Directory name under the financial data root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Financials => "financials",
            Self::BalanceSheet => "balance_sheet",
            Self::Cashflow => "cashflow",
            Self::Dividends => "dividends",
            Self::FinancialRatios => "financial_ratios",
        }
    }
}

impl fmt::Display for FinancialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Latest numeric fields for one symbol and statement kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialSnapshot {
    fields: BTreeMap<String, f64>,
}

impl FinancialSnapshot {
    pub fn new(fields: BTreeMap<String, f64>) -> Self {
        Self { fields }
    }

    /// Finite value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied().filter(|v| v.is_finite())
    }

    /// First present key among `keys`.
    pub fn first_of(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FinancialSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Read-only lookup of financial snapshots by symbol and kind.
pub trait FinancialStore: Send + Sync {
    fn lookup(&self, symbol: &str, kind: FinancialKind) -> Option<&FinancialSnapshot>;
}

/// Store with no data; every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFinancials;

impl FinancialStore for NoFinancials {
    fn lookup(&self, _symbol: &str, _kind: FinancialKind) -> Option<&FinancialSnapshot> {
        None
    }
}

/// Spellings tried when resolving a symbol against stored file names.
pub fn symbol_variants(symbol: &str) -> Vec<String> {
    let candidates = [
        symbol.to_string(),
        symbol.replace('_', "."),
        symbol.replace('.', "_"),
        symbol.to_uppercase(),
        symbol.replace("_HK", ".HK"),
        symbol.replace(".HK", "_HK"),
    ];
    let mut out: Vec<String> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Snapshots loaded eagerly from `<root>/<kind>/<SYMBOL>.csv`.
#[derive(Debug, Clone, Default)]
pub struct CsvFinancialStore {
    root: PathBuf,
    snapshots: HashMap<FinancialKind, HashMap<String, FinancialSnapshot>>,
}

impl CsvFinancialStore {
    /// Load every kind directory present under `root`. Unreadable files are
    /// logged and skipped; a missing root is an error.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, DataError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DataError::Io {
                path: root.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "financial data directory does not exist",
                ),
            });
        }

        let mut snapshots = HashMap::new();
        for kind in FinancialKind::ALL {
            let dir = root.join(kind.dir_name());
            if !dir.is_dir() {
                warn!(kind = %kind, path = %dir.display(), "financial kind directory missing");
                continue;
            }
            let by_symbol = load_kind(&dir)?;
            info!(kind = %kind, symbols = by_symbol.len(), "loaded financial snapshots");
            snapshots.insert(kind, by_symbol);
        }
        Ok(Self { root, snapshots })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn symbols(&self, kind: FinancialKind) -> usize {
        self.snapshots.get(&kind).map(HashMap::len).unwrap_or(0)
    }
}

impl FinancialStore for CsvFinancialStore {
    fn lookup(&self, symbol: &str, kind: FinancialKind) -> Option<&FinancialSnapshot> {
        let by_symbol = self.snapshots.get(&kind)?;
        symbol_variants(symbol)
            .iter()
            .find_map(|v| by_symbol.get(v))
    }
}

fn load_kind(dir: &Path) -> Result<HashMap<String, FinancialSnapshot>, DataError> {
    let mut out = HashMap::new();
    let entries = fs::read_dir(dir).map_err(|e| DataError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| DataError::io(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match read_snapshot(&path) {
            Ok(snapshot) => {
                out.insert(stem.to_uppercase(), snapshot);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping financial file"),
        }
    }
    Ok(out)
}

/// Read the first data row of a wide CSV whose first column is an index.
pub fn read_snapshot(path: &Path) -> Result<FinancialSnapshot, DataError> {
    let malformed = |detail: String| DataError::Malformed {
        what: path.display().to_string(),
        detail,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| malformed(e.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .clone();
    let mut fields = BTreeMap::new();
    if let Some(record) = reader.records().next() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        for (key, cell) in headers.iter().zip(record.iter()).skip(1) {
            if let Ok(v) = cell.trim().parse::<f64>() {
                fields.insert(key.to_string(), v);
            }
        }
    }
    Ok(FinancialSnapshot::new(fields))
}
