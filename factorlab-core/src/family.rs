//! Indicator family contract.
//!
//! A family is a pure computation over one symbol's `RawSeries` that emits a
//! set of named columns. Families never build tables directly: every column
//! goes through a `ColumnSink`, which asks the task's `IndicatorRegistry`
//! whether the name is still free and discards it if not.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::RawSeries;
use crate::registry::IndicatorRegistry;
use crate::table::{Column, IndicatorTable};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FamilyError {
    #[error("{family}: needs {required} rows, series has {actual}")]
    InsufficientHistory {
        family: String,
        required: usize,
        actual: usize,
    },

    #[error("{family}: column '{column}' has {actual} rows, earlier columns have {expected}")]
    Shape {
        family: String,
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("{family}: {message}")]
    Compute { family: String, message: String },
}

impl FamilyError {
    pub fn compute(family: &str, message: impl Into<String>) -> Self {
        Self::Compute {
            family: family.to_string(),
            message: message.into(),
        }
    }
}

/// Read-only inputs handed to every family invocation.
#[derive(Debug, Clone)]
pub struct FamilyContext {
    series: Arc<RawSeries>,
}

impl FamilyContext {
    pub fn new(series: Arc<RawSeries>) -> Self {
        Self { series }
    }

    pub fn symbol(&self) -> &str {
        self.series.symbol()
    }

    pub fn series(&self) -> &RawSeries {
        &self.series
    }

    pub fn rows(&self) -> usize {
        self.series.len()
    }
}

/// Collects one family's columns, deduplicating through the registry.
///
/// The first emitted column fixes the table's row count; a family that
/// resamples may emit a different length than the series, and the symbol
/// task aligns it afterwards.
pub struct ColumnSink<'r> {
    family: String,
    registry: &'r IndicatorRegistry,
    default_rows: usize,
    table: Option<IndicatorTable>,
}

impl<'r> ColumnSink<'r> {
    pub fn new(family: &str, registry: &'r IndicatorRegistry, default_rows: usize) -> Self {
        Self {
            family: family.to_string(),
            registry,
            default_rows,
            table: None,
        }
    }

    /// Emit a column. Returns `Ok(false)` when the name was already taken in
    /// this computation context; the values are dropped.
    pub fn emit(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<bool, FamilyError> {
        let name = name.into();
        if let Some(table) = &self.table {
            if values.len() != table.rows() {
                return Err(FamilyError::Shape {
                    family: self.family.clone(),
                    column: name,
                    expected: table.rows(),
                    actual: values.len(),
                });
            }
        }
        if !self.registry.claim_for(&self.family, &name) {
            return Ok(false);
        }
        let table = self
            .table
            .get_or_insert_with(|| IndicatorTable::empty(values.len()));
        table
            .push(Column::new(name, values))
            .map_err(|e| FamilyError::compute(&self.family, e.to_string()))?;
        Ok(true)
    }

    /// Emit a column holding one value on every row.
    pub fn emit_constant(&mut self, name: impl Into<String>, value: f64) -> Result<bool, FamilyError> {
        let rows = self.rows();
        self.emit(name, vec![value; rows])
    }

    /// Row count of the table being built.
    pub fn rows(&self) -> usize {
        self.table
            .as_ref()
            .map(IndicatorTable::rows)
            .unwrap_or(self.default_rows)
    }

    /// Whether this sink has accepted `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.table.as_ref().is_some_and(|t| t.contains(name))
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn finish(self) -> IndicatorTable {
        self.table
            .unwrap_or_else(|| IndicatorTable::empty(self.default_rows))
    }
}

/// A pluggable indicator computation.
///
/// Implementations must be safe to call concurrently for different series
/// and must not keep state between calls.
pub trait IndicatorFamily: Send + Sync {
    fn name(&self) -> &str;

    /// Shortest series the family accepts.
    fn min_rows(&self) -> usize {
        1
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError>;
}

/// Run one family against `ctx`, checking its history requirement first.
///
/// Names claimed before a failure stay claimed.
pub fn evaluate(
    family: &dyn IndicatorFamily,
    ctx: &FamilyContext,
    registry: &IndicatorRegistry,
) -> Result<IndicatorTable, FamilyError> {
    let required = family.min_rows();
    if ctx.rows() < required {
        return Err(FamilyError::InsufficientHistory {
            family: family.name().to_string(),
            required,
            actual: ctx.rows(),
        });
    }
    let mut sink = ColumnSink::new(family.name(), registry, ctx.rows());
    family.compute(ctx, &mut sink)?;
    Ok(sink.finish())
}

type ComputeFn =
    dyn Fn(&FamilyContext, &mut ColumnSink<'_>) -> Result<(), FamilyError> + Send + Sync;

/// Family backed by a closure. Handy for embedders and tests.
pub struct FnFamily {
    name: String,
    min_rows: usize,
    compute: Box<ComputeFn>,
}

impl FnFamily {
    pub fn new<F>(name: impl Into<String>, min_rows: usize, compute: F) -> Self
    where
        F: Fn(&FamilyContext, &mut ColumnSink<'_>) -> Result<(), FamilyError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            min_rows,
            compute: Box::new(compute),
        }
    }
}

impl std::fmt::Debug for FnFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFamily")
            .field("name", &self.name)
            .field("min_rows", &self.min_rows)
            .finish_non_exhaustive()
    }
}

impl IndicatorFamily for FnFamily {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_rows(&self) -> usize {
        self.min_rows
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError> {
        (self.compute)(ctx, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::NaiveDate;

    fn ctx(n: usize) -> FamilyContext {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = (0..n)
            .map(|i| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
            })
            .collect();
        FamilyContext::new(Arc::new(RawSeries::new("T", bars).unwrap()))
    }

    #[test]
    fn sink_drops_names_claimed_elsewhere() {
        let reg = IndicatorRegistry::new();
        reg.mark_computed("Close");
        let mut sink = ColumnSink::new("f", &reg, 3);
        assert!(!sink.emit("Close", vec![0.0; 3]).unwrap());
        assert!(sink.emit("X", vec![1.0; 3]).unwrap());
        let table = sink.finish();
        assert_eq!(table.width(), 1);
        assert!(table.contains("X"));
    }

    #[test]
    fn sink_rejects_ragged_columns() {
        let reg = IndicatorRegistry::new();
        let mut sink = ColumnSink::new("f", &reg, 3);
        sink.emit("A", vec![1.0; 4]).unwrap();
        let err = sink.emit("B", vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, FamilyError::Shape { expected: 4, actual: 3, .. }));
        // The rejected column was never claimed.
        assert!(reg.should_compute("B"));
    }

    #[test]
    fn empty_sink_uses_default_rows() {
        let reg = IndicatorRegistry::new();
        let table = ColumnSink::new("f", &reg, 7).finish();
        assert_eq!(table.rows(), 7);
        assert!(table.is_empty());
    }

    #[test]
    fn evaluate_checks_min_rows() {
        let fam = FnFamily::new("needs10", 10, |_, sink| {
            sink.emit_constant("Y", 1.0)?;
            Ok(())
        });
        let reg = IndicatorRegistry::new();
        let err = evaluate(&fam, &ctx(5), &reg).unwrap_err();
        assert_eq!(
            err,
            FamilyError::InsufficientHistory {
                family: "needs10".into(),
                required: 10,
                actual: 5
            }
        );
        let table = evaluate(&fam, &ctx(12), &reg).unwrap();
        assert_eq!(table.column("Y").unwrap(), &[1.0; 12]);
    }

    #[test]
    fn claims_survive_failure() {
        let fam = FnFamily::new("flaky", 1, |ctx, sink| {
            sink.emit("Z", vec![0.0; ctx.rows()])?;
            Err(FamilyError::compute("flaky", "boom"))
        });
        let reg = IndicatorRegistry::new();
        assert!(evaluate(&fam, &ctx(3), &reg).is_err());
        assert!(!reg.should_compute("Z"));
    }
}
