//! FactorLab Core: tables, the indicator registry, the family contract,
//! reconciliation, data sources and the built-in indicator families.
//!
//! This crate has no threads of its own. Everything here is either a value
//! type or a `Send + Sync` collaborator that `factorlab-runner` schedules:
//! - Domain types (bars, validated per-symbol series)
//! - Column tables and the keyed universe `Frame`
//! - Per-task `IndicatorRegistry` with atomic claims
//! - `IndicatorFamily` trait and `ColumnSink`
//! - Tiered row reconciliation and per-symbol column merge
//! - Series sources (qlib binary store, in-memory, synthetic) and financial snapshots

pub mod data;
pub mod domain;
pub mod families;
pub mod family;
pub mod indicators;
pub mod reconcile;
pub mod registry;
pub mod table;

pub use family::{evaluate, ColumnSink, FamilyContext, FamilyError, FnFamily, IndicatorFamily};
pub use reconcile::{reconcile_rows, MergeTier, ReconcileError, Reconciled};
pub use registry::{IndicatorRegistry, SkippedDuplicate};
pub use table::{Column, Frame, IndicatorTable, TableError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner moves across threads is
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::RawSeries>();
        require_sync::<domain::RawSeries>();

        require_send::<IndicatorTable>();
        require_sync::<IndicatorTable>();
        require_send::<Frame>();
        require_sync::<Frame>();
        require_send::<IndicatorRegistry>();
        require_sync::<IndicatorRegistry>();
        require_send::<FamilyContext>();
        require_sync::<FamilyContext>();
        require_send::<FamilyError>();
        require_send::<Reconciled>();

        require_send::<data::DataError>();
        require_send::<data::QlibStore>();
        require_sync::<data::QlibStore>();
        require_send::<data::CsvFinancialStore>();
        require_sync::<data::CsvFinancialStore>();
        require_send::<families::Financial>();
        require_sync::<families::Financial>();
    }
}
