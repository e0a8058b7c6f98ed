//! Indicator tables and keyed frames.
//!
//! `IndicatorTable` is what one indicator family produces: named numeric
//! columns sharing a row count. `Frame` is the keyed form used at universe
//! scope: every row carries its `Date` and `Symbol`, followed by numeric
//! columns. Missing values are `f64::NAN`.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{BASE_COLUMNS, DATE_COLUMN, SYMBOL_COLUMN};

/// Errors from table construction and projection.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TableError {
    #[error("column '{name}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("column '{0}' not present")]
    MissingColumn(String),

    #[error("column name '{0}' is reserved for a key column")]
    ReservedName(String),

    #[error("key columns disagree: {dates} dates, {symbols} symbols")]
    KeyMismatch { dates: usize, symbols: usize },
}

/// A named numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// How a table was adjusted to a target row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resize {
    Unchanged,
    Truncated { from: usize },
    Padded { from: usize },
}

/// Columns produced by one indicator family invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorTable {
    rows: usize,
    columns: Vec<Column>,
}

impl IndicatorTable {
    /// A table with a fixed row count and no columns yet.
    pub fn empty(rows: usize) -> Self {
        Self {
            rows,
            columns: Vec::new(),
        }
    }

    pub fn new(rows: usize, columns: Vec<Column>) -> Result<Self, TableError> {
        let mut table = Self::empty(rows);
        for column in columns {
            table.push(column)?;
        }
        Ok(table)
    }

    /// Append a column; its length must equal the table's row count.
    pub fn push(&mut self, column: Column) -> Result<(), TableError> {
        if column.len() != self.rows {
            return Err(TableError::LengthMismatch {
                name: column.name,
                expected: self.rows,
                actual: column.values.len(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// True when there is nothing to merge: no columns or no rows.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Truncate (if longer) or right-pad with NaN (if shorter) to `rows`.
    pub fn resized(mut self, rows: usize) -> (Self, Resize) {
        let from = self.rows;
        if from == rows {
            return (self, Resize::Unchanged);
        }
        for column in &mut self.columns {
            column.values.resize(rows, f64::NAN);
        }
        self.rows = rows;
        let resize = if from > rows {
            Resize::Truncated { from }
        } else {
            Resize::Padded { from }
        };
        (self, resize)
    }
}

/// A keyed table: one row per (symbol, date).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(
        dates: Vec<NaiveDate>,
        symbols: Vec<String>,
        columns: Vec<Column>,
    ) -> Result<Self, TableError> {
        if dates.len() != symbols.len() {
            return Err(TableError::KeyMismatch {
                dates: dates.len(),
                symbols: symbols.len(),
            });
        }
        for column in &columns {
            if column.name == DATE_COLUMN || column.name == SYMBOL_COLUMN {
                return Err(TableError::ReservedName(column.name.clone()));
            }
            if column.len() != dates.len() {
                return Err(TableError::LengthMismatch {
                    name: column.name.clone(),
                    expected: dates.len(),
                    actual: column.len(),
                });
            }
        }
        Ok(Self {
            dates,
            symbols,
            columns,
        })
    }

    /// Attach a constant symbol and the date index to an indicator table.
    pub fn for_symbol(
        symbol: &str,
        dates: Vec<NaiveDate>,
        table: IndicatorTable,
    ) -> Result<Self, TableError> {
        let symbols = vec![symbol.to_string(); dates.len()];
        Self::new(dates, symbols, table.into_columns())
    }

    pub fn rows(&self) -> usize {
        self.dates.len()
    }

    /// Number of numeric columns (key columns excluded).
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Full header including the key columns.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![DATE_COLUMN.to_string(), SYMBOL_COLUMN.to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        header
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Distinct symbols in first-appearance order.
    pub fn distinct_symbols(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.symbols
            .iter()
            .filter(|s| seen.insert(s.as_str()))
            .map(|s| s.as_str())
            .collect()
    }

    pub fn rows_for(&self, symbol: &str) -> usize {
        self.symbols.iter().filter(|s| *s == symbol).count()
    }

    /// Drop later columns whose name repeats an earlier one.
    /// Returns the dropped names.
    pub fn drop_duplicate_columns(&mut self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();
        self.columns.retain(|c| {
            if seen.insert(c.name.clone()) {
                true
            } else {
                dropped.push(c.name.clone());
                false
            }
        });
        dropped
    }

    /// Project onto `names`, in that order.
    pub fn select(&self, names: &[String]) -> Result<Frame, TableError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let values = self
                .column(name)
                .ok_or_else(|| TableError::MissingColumn(name.clone()))?;
            columns.push(Column::new(name.clone(), values.to_vec()));
        }
        Ok(Frame {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            columns,
        })
    }

    /// Append rows from `other`, which must carry exactly the same column
    /// names in the same order.
    pub(crate) fn append(&mut self, other: Frame) -> Result<(), TableError> {
        if self.columns.is_empty() && self.dates.is_empty() {
            *self = other;
            return Ok(());
        }
        for (mine, theirs) in self.columns.iter().zip(other.columns.iter()) {
            if mine.name != theirs.name {
                return Err(TableError::MissingColumn(theirs.name.clone()));
            }
        }
        if self.columns.len() != other.columns.len() {
            return Err(TableError::LengthMismatch {
                name: "<schema>".into(),
                expected: self.columns.len(),
                actual: other.columns.len(),
            });
        }
        self.dates.extend(other.dates);
        self.symbols.extend(other.symbols);
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns) {
            mine.values.extend(theirs.values);
        }
        Ok(())
    }

    /// Remove rows that repeat an earlier row exactly (keys and values).
    /// NaN compares equal to NaN here. Returns the number removed.
    ///
    /// Rows are bucketed by `(Date, Symbol)`; values are only compared
    /// within a bucket, read in place from the columns.
    pub fn dedup_rows(&mut self) -> usize {
        let n = self.rows();
        let mut buckets: HashMap<(NaiveDate, &str), Vec<usize>> = HashMap::with_capacity(n);
        let mut keep = vec![true; n];
        for row in 0..n {
            let kept = buckets
                .entry((self.dates[row], self.symbols[row].as_str()))
                .or_default();
            if kept.iter().any(|&earlier| self.same_values(earlier, row)) {
                keep[row] = false;
            } else {
                kept.push(row);
            }
        }
        drop(buckets);
        let removed = keep.iter().filter(|k| !**k).count();
        if removed > 0 {
            self.retain_rows(&keep);
        }
        removed
    }

    fn same_values(&self, a: usize, b: usize) -> bool {
        self.columns
            .iter()
            .all(|c| canonical_bits(c.values[a]) == canonical_bits(c.values[b]))
    }

    /// Order columns as Open, High, Low, Close, Volume, then every other
    /// column lexicographically.
    pub fn finalize(mut self) -> Self {
        self.columns.sort_by(|a, b| column_rank(&a.name).cmp(&column_rank(&b.name)));
        self
    }

    /// Sort rows by (symbol, date).
    pub fn sort_rows(&mut self) {
        let mut order: Vec<usize> = (0..self.rows()).collect();
        order.sort_by(|&a, &b| {
            self.symbols[a]
                .cmp(&self.symbols[b])
                .then(self.dates[a].cmp(&self.dates[b]))
        });
        self.dates = order.iter().map(|&i| self.dates[i]).collect();
        self.symbols = order.iter().map(|&i| self.symbols[i].clone()).collect();
        for column in &mut self.columns {
            column.values = order.iter().map(|&i| column.values[i]).collect();
        }
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        fn filter<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| v.clone())
                .collect()
        }
        self.dates = filter(&self.dates, keep);
        self.symbols = filter(&self.symbols, keep);
        for column in &mut self.columns {
            column.values = filter(&column.values, keep);
        }
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

fn column_rank(name: &str) -> (usize, &str) {
    match BASE_COLUMNS.iter().position(|b| *b == name) {
        Some(pos) => (pos, ""),
        None => (BASE_COLUMNS.len(), name),
    }
}
