//! Universe Orchestrator: one Symbol Task per symbol, then one reconcile.
//!
//! Symbols fan out over a private symbol pool (or run in list order when
//! parallelism is off). Each symbol is isolated: a missing series, a
//! timeout or a panic becomes a `SymbolFailure` and the run continues.
//! In concurrent mode rows arrive in completion order; callers that need a
//! stable order sort the final frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use factorlab_core::data::{DataError, SeriesSource};
use factorlab_core::reconcile::{reconcile_rows, MergeTier, ReconcileError};
use factorlab_core::{Frame, IndicatorFamily};

use crate::config::{ConfigError, EngineConfig};
use crate::fanout::{run_sequential, Outcome, WorkerPool};
use crate::symbol_task::{
    FailureKind, FamilyFailure, SymbolError, SymbolReport, SymbolResult, TaskContext,
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("cannot list symbols: {0}")]
    Universe(#[from] DataError),
}

/// A symbol that contributed no rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Observational progress. Never affects control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        total: usize,
    },
    SymbolCompleted {
        symbol: String,
        rows: usize,
        done: usize,
        total: usize,
    },
    SymbolFailed {
        symbol: String,
        kind: FailureKind,
        done: usize,
        total: usize,
    },
    Finished {
        stats: RunStats,
    },
}

pub type ProgressFn = dyn Fn(&ProgressEvent) + Send + Sync;

/// Final table plus everything that went wrong producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseReport {
    pub table: Frame,
    /// `None` when no symbol produced rows.
    pub merge_tier: Option<MergeTier>,
    pub degraded: bool,
    pub duplicate_rows_removed: usize,
    /// Columns some symbol produced that the merged table lacks.
    pub dropped_columns: Vec<String>,
    pub stats: RunStats,
    pub failures: Vec<SymbolFailure>,
    pub family_failures: Vec<FamilyFailure>,
    pub symbol_reports: Vec<SymbolReport>,
    pub elapsed: Duration,
}

impl UniverseReport {
    fn empty(stats: RunStats, failures: Vec<SymbolFailure>, elapsed: Duration) -> Self {
        Self {
            table: Frame::default(),
            merge_tier: None,
            degraded: false,
            duplicate_rows_removed: 0,
            dropped_columns: Vec::new(),
            stats,
            failures,
            family_failures: Vec::new(),
            symbol_reports: Vec::new(),
            elapsed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Failures of one kind, e.g. every `DataUnavailable` symbol.
    pub fn failures_of(&self, kind: FailureKind) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.symbol.as_str())
            .collect()
    }
}

pub struct Orchestrator {
    config: EngineConfig,
    tasks: Arc<TaskContext>,
    symbol_pool: Option<WorkerPool>,
    progress: Option<Arc<ProgressFn>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("tasks", &self.tasks)
            .field("symbol_pool", &self.symbol_pool)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Validate `config` and build the symbol and family pools. No pool is
    /// built when `config.parallel` is false.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn SeriesSource>,
        families: Vec<Arc<dyn IndicatorFamily>>,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let (symbol_pool, family_pool) = if config.parallel {
            let family_threads = config.family_pool_size(families.len());
            (
                Some(WorkerPool::new("factorlab-symbol", config.max_workers)?),
                Some(WorkerPool::new("factorlab-family", family_threads)?),
            )
        } else {
            (None, None)
        };
        info!(
            source = source.name(),
            families = families.len(),
            parallel = config.parallel,
            symbol_workers = symbol_pool.as_ref().map_or(0, WorkerPool::threads),
            family_workers = family_pool.as_ref().map_or(0, WorkerPool::threads),
            "orchestrator ready"
        );
        let tasks = Arc::new(TaskContext::new(
            source,
            families,
            family_pool,
            config.family_timeout,
        ));
        Ok(Self {
            config,
            tasks,
            symbol_pool,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn family_names(&self) -> Vec<String> {
        self.tasks.family_names()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    /// One symbol on the calling thread. Families still use the family
    /// pool when parallelism is on.
    pub fn run_symbol(&self, symbol: &str) -> Result<SymbolResult, SymbolError> {
        self.run_symbol_with(symbol, self.config.parallel)
    }

    /// `run_symbol` with parallelism chosen for this call. Asking for
    /// parallelism from an orchestrator built without pools runs
    /// sequentially.
    pub fn run_symbol_with(&self, symbol: &str, parallel: bool) -> Result<SymbolResult, SymbolError> {
        self.tasks.run_with(symbol, self.effective_parallel(parallel))
    }

    fn effective_parallel(&self, requested: bool) -> bool {
        if requested && self.symbol_pool.is_none() {
            debug!("no worker pools were built, running sequentially");
        }
        requested && self.symbol_pool.is_some()
    }

    /// Every symbol the source knows about, in the source's order.
    pub fn list_symbols(&self) -> Result<Vec<String>, RunError> {
        Ok(self.tasks.source().list_symbols()?)
    }

    /// `run_universe` over `list_symbols`.
    pub fn run_all(&self, max_symbols: Option<usize>) -> Result<UniverseReport, RunError> {
        let symbols = self.list_symbols()?;
        Ok(self.run_universe(&symbols, max_symbols))
    }

    /// Run every symbol and reconcile the results. `max_symbols` (or the
    /// configured limit) truncates the list before fan-out.
    pub fn run_universe(&self, symbols: &[String], max_symbols: Option<usize>) -> UniverseReport {
        self.run_universe_with(symbols, max_symbols, self.config.parallel)
    }

    /// `run_universe` with parallelism chosen for this call.
    pub fn run_universe_with(
        &self,
        symbols: &[String],
        max_symbols: Option<usize>,
        parallel: bool,
    ) -> UniverseReport {
        let parallel = self.effective_parallel(parallel);
        let started = Instant::now();
        let limit = max_symbols.or(self.config.max_symbols).unwrap_or(symbols.len());
        let symbols: Vec<String> = symbols.iter().take(limit).cloned().collect();
        let total = symbols.len();
        if total == 0 {
            info!("empty universe, nothing to compute");
            let report = UniverseReport::empty(RunStats::default(), Vec::new(), started.elapsed());
            self.emit(ProgressEvent::Finished { stats: report.stats });
            return report;
        }

        info!(symbols = total, parallel, "computing universe");
        self.emit(ProgressEvent::Started { total });

        let jobs: Vec<_> = symbols
            .iter()
            .map(|symbol| {
                let tasks = Arc::clone(&self.tasks);
                let symbol = symbol.clone();
                move || tasks.run_with(&symbol, parallel)
            })
            .collect();
        let outcomes = match self.symbol_pool.as_ref().filter(|_| parallel) {
            Some(pool) => {
                let budget = self.config.symbol_timeout();
                pool.run_all(jobs, |_| budget)
            }
            None => run_sequential(jobs),
        };

        let mut frames = Vec::new();
        let mut symbol_reports = Vec::new();
        let mut failures = Vec::new();
        for (finished, (index, outcome)) in (1..).zip(outcomes) {
            let symbol = &symbols[index];
            match classify(symbol, outcome) {
                Ok(result) => {
                    self.emit(ProgressEvent::SymbolCompleted {
                        symbol: symbol.clone(),
                        rows: result.frame.rows(),
                        done: finished,
                        total,
                    });
                    frames.push(result.frame);
                    symbol_reports.push(result.report);
                }
                Err(failure) => {
                    warn!(symbol = %failure.symbol, kind = %failure.kind, error = %failure.message, "symbol failed");
                    self.emit(ProgressEvent::SymbolFailed {
                        symbol: symbol.clone(),
                        kind: failure.kind,
                        done: finished,
                        total,
                    });
                    failures.push(failure);
                }
            }
        }

        let stats = RunStats {
            attempted: total,
            succeeded: symbol_reports.len(),
            failed: failures.len(),
        };
        let family_failures: Vec<FamilyFailure> = symbol_reports
            .iter()
            .flat_map(|r| r.family_failures.iter().cloned())
            .collect();

        let mut report = match reconcile_rows(frames) {
            Ok(reconciled) => UniverseReport {
                table: reconciled.frame,
                merge_tier: Some(reconciled.tier),
                degraded: reconciled.degraded,
                duplicate_rows_removed: reconciled.duplicate_rows_removed,
                dropped_columns: reconciled.dropped_columns,
                stats,
                failures,
                family_failures,
                symbol_reports,
                elapsed: Duration::ZERO,
            },
            Err(ReconcileError::NoUsableInput) => {
                warn!(attempted = total, "no symbol produced data");
                UniverseReport::empty(stats, failures, Duration::ZERO)
            }
        };
        report.elapsed = started.elapsed();

        info!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            rows = report.table.rows(),
            columns = report.table.width(),
            tier = ?report.merge_tier,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "universe complete"
        );
        self.emit(ProgressEvent::Finished { stats });
        report
    }
}

fn classify(
    symbol: &str,
    outcome: Outcome<Result<SymbolResult, SymbolError>>,
) -> Result<SymbolResult, SymbolFailure> {
    let (kind, message) = match outcome {
        Outcome::Completed(Ok(result)) => return Ok(result),
        Outcome::Completed(Err(e)) => (e.kind(), e.to_string()),
        Outcome::TimedOut { after } => (
            FailureKind::SymbolTimeout,
            format!("abandoned after {} ms", after.as_millis()),
        ),
        Outcome::Panicked(message) => (FailureKind::SymbolPanicked, message),
    };
    Err(SymbolFailure {
        symbol: symbol.to_string(),
        kind,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorlab_core::data::SyntheticSource;
    use factorlab_core::FnFamily;
    use std::sync::Mutex;

    fn simple_family() -> Arc<dyn IndicatorFamily> {
        Arc::new(FnFamily::new("simple", 1, |ctx, sink| {
            sink.emit("ONE", vec![1.0; ctx.rows()])?;
            Ok(())
        }))
    }

    fn orchestrator(config: EngineConfig) -> Orchestrator {
        let source = SyntheticSource::numbered(4, 30);
        Orchestrator::new(config, Arc::new(source), vec![simple_family()]).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            max_workers: 0,
            ..EngineConfig::default()
        };
        let err = Orchestrator::new(config, Arc::new(SyntheticSource::numbered(1, 5)), vec![]).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn max_symbols_truncates_before_fanout() {
        let orch = orchestrator(EngineConfig::sequential());
        let report = orch.run_all(Some(2)).unwrap();
        assert_eq!(report.stats.attempted, 2);
        assert_eq!(report.table.distinct_symbols(), vec!["SYN000", "SYN001"]);
    }

    #[test]
    fn progress_events_bracket_the_run() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let orch = orchestrator(EngineConfig::sequential())
            .with_progress(move |e| sink.lock().unwrap().push(e.clone()));
        let symbols = vec!["SYN000".to_string(), "NOPE".to_string()];
        orch.run_universe(&symbols, None);

        let events = events.lock().unwrap();
        assert_eq!(events.first(), Some(&ProgressEvent::Started { total: 2 }));
        assert!(matches!(
            events[2],
            ProgressEvent::SymbolFailed {
                kind: FailureKind::DataUnavailable,
                done: 2,
                ..
            }
        ));
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Finished {
                stats: RunStats {
                    attempted: 2,
                    succeeded: 1,
                    failed: 1
                }
            })
        );
    }

    #[test]
    fn config_limit_applies_when_no_argument_given() {
        let config = EngineConfig {
            max_symbols: Some(1),
            ..EngineConfig::sequential()
        };
        let report = orchestrator(config).run_all(None).unwrap();
        assert_eq!(report.stats.attempted, 1);
    }
}
