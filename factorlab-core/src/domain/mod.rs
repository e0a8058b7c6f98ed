//! Domain types: bars and the validated per-symbol series.

pub mod bar;

pub use bar::{Bar, RawSeries};

/// Base price/volume column names, in output order.
pub const BASE_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

/// Key column holding the trading date.
pub const DATE_COLUMN: &str = "Date";

/// Key column holding the symbol identifier.
pub const SYMBOL_COLUMN: &str = "Symbol";
