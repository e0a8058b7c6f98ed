//! Data access collaborators: raw series sources and financial snapshots.

pub mod financial;
pub mod provider;
pub mod qlib;
pub mod synthetic;

pub use financial::{CsvFinancialStore, FinancialKind, FinancialSnapshot, FinancialStore, NoFinancials};
pub use provider::{DataError, MemorySource, SeriesSource};
pub use qlib::QlibStore;
pub use synthetic::SyntheticSource;
