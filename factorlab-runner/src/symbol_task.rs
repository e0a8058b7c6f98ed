//! Symbol Task: every indicator family for one symbol, merged into one frame.
//!
//! The task owns a fresh `IndicatorRegistry`. Base column names are claimed
//! before any family runs, so a family re-emitting `Close` loses the name.
//! Family failures are recorded and never fail the task; only a missing or
//! empty series does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use factorlab_core::data::{DataError, SeriesSource};
use factorlab_core::domain::{RawSeries, BASE_COLUMNS, DATE_COLUMN, SYMBOL_COLUMN};
use factorlab_core::reconcile::merge_columns;
use factorlab_core::{
    evaluate, Column, FamilyContext, FamilyError, Frame, IndicatorFamily, IndicatorRegistry,
    IndicatorTable, SkippedDuplicate, TableError,
};

use crate::config::FamilyTimeout;
use crate::fanout::{run_sequential, Outcome, WorkerPool};

/// Failure categories recorded in reports and manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DataUnavailable,
    SymbolTimeout,
    SymbolPanicked,
    FamilyComputeError,
    FamilyTimeout,
    InsufficientHistory,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DataUnavailable => "data_unavailable",
            Self::SymbolTimeout => "symbol_timeout",
            Self::SymbolPanicked => "symbol_panicked",
            Self::FamilyComputeError => "family_compute_error",
            Self::FamilyTimeout => "family_timeout",
            Self::InsufficientHistory => "insufficient_history",
        };
        f.write_str(s)
    }
}

/// One family that produced no columns for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyFailure {
    pub symbol: String,
    pub family: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("{symbol}: no data: {source}")]
    DataUnavailable {
        symbol: String,
        #[source]
        source: DataError,
    },

    #[error("{symbol}: {source}")]
    Table {
        symbol: String,
        #[source]
        source: TableError,
    },
}

impl SymbolError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::DataUnavailable { .. } => FailureKind::DataUnavailable,
            // Only reachable through a misbehaving family; counts as one.
            Self::Table { .. } => FailureKind::FamilyComputeError,
        }
    }
}

/// What happened inside one Symbol Task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub rows: usize,
    pub columns: usize,
    pub families_succeeded: Vec<String>,
    pub family_failures: Vec<FamilyFailure>,
    /// `(family, column)` pairs discarded because the name was taken.
    pub skipped_duplicates: Vec<(String, String)>,
    pub truncated: Vec<String>,
    pub padded: Vec<String>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// One symbol's merged table plus its report.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolResult {
    pub frame: Frame,
    pub report: SymbolReport,
}

impl SymbolResult {
    pub fn symbol(&self) -> &str {
        &self.report.symbol
    }
}

/// Everything a Symbol Task needs, shared by all tasks of a run.
pub struct TaskContext {
    source: Arc<dyn SeriesSource>,
    families: Vec<Arc<dyn IndicatorFamily>>,
    family_pool: Option<WorkerPool>,
    family_timeout: FamilyTimeout,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("source", &self.source.name())
            .field("families", &self.family_names())
            .field("family_pool", &self.family_pool)
            .field("family_timeout", &self.family_timeout)
            .finish()
    }
}

impl TaskContext {
    /// `family_pool` of `None` runs families in declaration order on the
    /// calling thread.
    pub fn new(
        source: Arc<dyn SeriesSource>,
        families: Vec<Arc<dyn IndicatorFamily>>,
        family_pool: Option<WorkerPool>,
        family_timeout: FamilyTimeout,
    ) -> Self {
        Self {
            source,
            families,
            family_pool,
            family_timeout,
        }
    }

    pub fn source(&self) -> &dyn SeriesSource {
        self.source.as_ref()
    }

    pub fn family_names(&self) -> Vec<String> {
        self.families.iter().map(|f| f.name().to_string()).collect()
    }

    /// Compute every family for `symbol`, on the family pool when there is
    /// one.
    pub fn run(&self, symbol: &str) -> Result<SymbolResult, SymbolError> {
        self.run_with(symbol, true)
    }

    /// `parallel = false` runs families in declaration order on the calling
    /// thread even when a family pool exists.
    pub fn run_with(&self, symbol: &str, parallel: bool) -> Result<SymbolResult, SymbolError> {
        let started = Instant::now();
        let series = self
            .source
            .fetch(symbol)
            .and_then(|s| {
                if s.is_empty() {
                    Err(DataError::Empty {
                        symbol: symbol.to_string(),
                    })
                } else {
                    Ok(s)
                }
            })
            .map_err(|source| SymbolError::DataUnavailable {
                symbol: symbol.to_string(),
                source,
            })?;
        let symbol = series.symbol().to_string();
        let series = Arc::new(series);
        let rows = series.len();

        let registry = Arc::new(IndicatorRegistry::new());
        for name in BASE_COLUMNS.iter().chain([DATE_COLUMN, SYMBOL_COLUMN].iter()) {
            registry.mark_computed(name);
        }

        let outcomes = self.run_families(&series, &registry, parallel);

        let mut parts: Vec<(String, IndicatorTable)> = vec![("base".to_string(), base_table(&series))];
        let mut families_succeeded = Vec::new();
        let mut family_failures = Vec::new();
        for (family, outcome) in self.families.iter().zip(outcomes) {
            let name = family.name().to_string();
            match classify(outcome) {
                Ok(table) => {
                    debug!(symbol = %symbol, family = %name, columns = table.width(), "family computed");
                    families_succeeded.push(name.clone());
                    parts.push((name, table));
                }
                Err((kind, message)) => {
                    warn!(symbol = %symbol, family = %name, kind = %kind, error = %message, "family failed");
                    family_failures.push(FamilyFailure {
                        symbol: symbol.clone(),
                        family: name,
                        kind,
                        message,
                    });
                }
            }
        }

        let merged = merge_columns(rows, parts);
        let frame = Frame::for_symbol(&symbol, series.dates(), merged.table).map_err(|source| {
            SymbolError::Table {
                symbol: symbol.clone(),
                source,
            }
        })?;

        let report = SymbolReport {
            symbol,
            rows: frame.rows(),
            columns: frame.width(),
            families_succeeded,
            family_failures,
            skipped_duplicates: registry
                .skipped()
                .into_iter()
                .map(|SkippedDuplicate { name, family }| (family, name))
                .collect(),
            truncated: merged.truncated,
            padded: merged.padded,
            elapsed: started.elapsed(),
        };
        Ok(SymbolResult { frame, report })
    }

    /// Family outcomes in declaration order.
    fn run_families(
        &self,
        series: &Arc<RawSeries>,
        registry: &Arc<IndicatorRegistry>,
        parallel: bool,
    ) -> Vec<Outcome<Result<IndicatorTable, FamilyError>>> {
        let jobs: Vec<_> = self
            .families
            .iter()
            .map(|family| {
                let family = Arc::clone(family);
                let ctx = FamilyContext::new(Arc::clone(series));
                let registry = Arc::clone(registry);
                move || evaluate(family.as_ref(), &ctx, &registry)
            })
            .collect();

        let mut indexed = match self.family_pool.as_ref().filter(|_| parallel) {
            Some(pool) => {
                let budget = self.family_timeout.for_rows(series.len());
                pool.run_all(jobs, |_| budget)
            }
            None => run_sequential(jobs),
        };
        // Merge order follows declaration order, not completion order.
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

fn classify(
    outcome: Outcome<Result<IndicatorTable, FamilyError>>,
) -> Result<IndicatorTable, (FailureKind, String)> {
    match outcome {
        Outcome::Completed(Ok(table)) => Ok(table),
        Outcome::Completed(Err(e @ FamilyError::InsufficientHistory { .. })) => {
            Err((FailureKind::InsufficientHistory, e.to_string()))
        }
        Outcome::Completed(Err(e)) => Err((FailureKind::FamilyComputeError, e.to_string())),
        Outcome::TimedOut { after } => Err((
            FailureKind::FamilyTimeout,
            format!("abandoned after {} ms", after.as_millis()),
        )),
        Outcome::Panicked(message) => Err((FailureKind::FamilyComputeError, format!("panicked: {message}"))),
    }
}

/// Open, High, Low, Close, Volume straight from the series.
fn base_table(series: &RawSeries) -> IndicatorTable {
    let columns = vec![
        Column::new(BASE_COLUMNS[0], series.opens()),
        Column::new(BASE_COLUMNS[1], series.highs()),
        Column::new(BASE_COLUMNS[2], series.lows()),
        Column::new(BASE_COLUMNS[3], series.closes()),
        Column::new(BASE_COLUMNS[4], series.volumes()),
    ];
    let mut table = IndicatorTable::empty(series.len());
    for column in columns {
        // Every accessor returns one value per bar.
        if let Err(e) = table.push(column) {
            warn!(error = %e, "base column rejected");
        }
    }
    table
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorlab_core::data::MemorySource;
    use factorlab_core::domain::Bar;
    use factorlab_core::FnFamily;

    fn series(symbol: &str, rows: usize) -> RawSeries {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = (0..rows)
            .map(|i| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: 10.0 + i as f64,
                high: 11.0 + i as f64,
                low: 9.0 + i as f64,
                close: 10.5 + i as f64,
                volume: 1_000.0,
            })
            .collect();
        RawSeries::new(symbol, bars).unwrap()
    }

    fn family(name: &str, column: &'static str, value: f64) -> Arc<dyn IndicatorFamily> {
        Arc::new(FnFamily::new(name, 1, move |ctx, sink| {
            sink.emit(column, vec![value; ctx.rows()])?;
            Ok(())
        }))
    }

    fn context(families: Vec<Arc<dyn IndicatorFamily>>, pool: Option<WorkerPool>) -> TaskContext {
        let source = MemorySource::new().with(series("AAA", 12));
        TaskContext::new(Arc::new(source), families, pool, FamilyTimeout::default())
    }

    #[test]
    fn base_columns_and_keys_are_attached() {
        let ctx = context(vec![family("f", "X", 1.0)], None);
        let result = ctx.run("aaa").unwrap();
        assert_eq!(result.symbol(), "AAA");
        assert_eq!(result.frame.rows(), 12);
        assert_eq!(
            result.frame.column_names(),
            vec!["Open", "High", "Low", "Close", "Volume", "X"]
        );
        assert!(result.frame.symbols().iter().all(|s| s == "AAA"));
    }

    #[test]
    fn family_cannot_shadow_base_columns() {
        let ctx = context(vec![family("shadow", "Close", -1.0)], None);
        let result = ctx.run("AAA").unwrap();
        assert_eq!(result.frame.column("Close").unwrap()[0], 10.5);
        assert_eq!(result.report.skipped_duplicates, vec![("shadow".into(), "Close".into())]);
    }

    #[test]
    fn missing_symbol_is_data_unavailable() {
        let ctx = context(vec![], None);
        let err = ctx.run("ZZZ").unwrap_err();
        assert_eq!(err.kind(), FailureKind::DataUnavailable);
    }

    #[test]
    fn pool_results_follow_declaration_order() {
        let pool = WorkerPool::new("fam", 2).unwrap();
        let ctx = context(vec![family("first", "X", 1.0), family("second", "Y", 2.0)], Some(pool));
        let result = ctx.run("AAA").unwrap();
        assert_eq!(result.report.families_succeeded, vec!["first", "second"]);
        let names = result.frame.column_names();
        assert!(names.contains(&"X") && names.contains(&"Y"));
    }

    #[test]
    fn sequential_override_skips_the_pool() {
        let pool = WorkerPool::new("fam", 2).unwrap();
        let here = std::thread::current().id();
        let same_thread: Arc<dyn IndicatorFamily> = Arc::new(FnFamily::new("here", 1, move |ctx, sink| {
            let flag = if std::thread::current().id() == here { 1.0 } else { 0.0 };
            sink.emit("HERE", vec![flag; ctx.rows()])?;
            Ok(())
        }));
        let ctx = context(vec![same_thread], Some(pool));

        let pooled = ctx.run("AAA").unwrap();
        assert_eq!(pooled.frame.column("HERE").unwrap()[0], 0.0);
        let inline = ctx.run_with("AAA", false).unwrap();
        assert_eq!(inline.frame.column("HERE").unwrap()[0], 1.0);
    }

    #[test]
    fn short_output_is_padded() {
        let short: Arc<dyn IndicatorFamily> = Arc::new(FnFamily::new("weekly", 1, |_, sink| {
            sink.emit("W", vec![1.0; 3])?;
            Ok(())
        }));
        let result = context(vec![short], None).run("AAA").unwrap();
        assert_eq!(result.report.padded, vec!["weekly"]);
        let w = result.frame.column("W").unwrap();
        assert_eq!(w.len(), 12);
        assert!(w[3].is_nan());
    }

    #[test]
    fn insufficient_history_is_classified() {
        let picky: Arc<dyn IndicatorFamily> =
            Arc::new(FnFamily::new("long", 100, |_, _| Ok(())));
        let result = context(vec![picky], None).run("AAA").unwrap();
        assert_eq!(result.report.family_failures[0].kind, FailureKind::InsufficientHistory);
        assert_eq!(result.frame.width(), 5);
    }
}
