//! FactorLab Runner: orchestration on top of `factorlab-core`.
//!
//! This crate provides:
//! - Engine and run configuration (TOML)
//! - Named worker pools with per-unit timeouts and panic isolation
//! - The Symbol Task (every family for one symbol, merged)
//! - The Universe Orchestrator (every symbol, reconciled)
//! - CSV/Parquet export with a JSON run manifest

pub mod config;
pub mod export;
pub mod fanout;
pub mod symbol_task;
pub mod universe;

pub use config::{ConfigError, DataConfig, EngineConfig, FamilyTimeout, OutputConfig, OutputFormat, RunConfig};
pub use export::{export, write_csv, write_parquet, ExportError, Exported, LabelMap, RunManifest};
pub use fanout::{Outcome, WorkerPool};
pub use symbol_task::{FailureKind, FamilyFailure, SymbolError, SymbolReport, SymbolResult, TaskContext};
pub use universe::{
    Orchestrator, ProgressEvent, RunError, RunStats, SymbolFailure, UniverseReport,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn symbol_results_cross_threads() {
        assert_send::<SymbolResult>();
        assert_send::<SymbolError>();
        assert_send::<Result<SymbolResult, SymbolError>>();
    }

    #[test]
    fn shared_context_is_send_sync() {
        assert_send::<TaskContext>();
        assert_sync::<TaskContext>();
        assert_send::<WorkerPool>();
        assert_sync::<WorkerPool>();
    }

    #[test]
    fn orchestrator_is_send_sync() {
        assert_send::<Orchestrator>();
        assert_sync::<Orchestrator>();
    }

    #[test]
    fn reports_are_send_sync() {
        assert_send::<UniverseReport>();
        assert_sync::<UniverseReport>();
        assert_send::<RunManifest>();
        assert_sync::<RunManifest>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }
}
