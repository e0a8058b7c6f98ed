//! Export: CSV and Parquet tables, descriptive labels, JSON run manifest.
//!
//! Missing values (NaN) are written as empty CSV cells and Parquet nulls.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use polars::prelude::{DataFrame, DataType, ParquetWriter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use factorlab_core::domain::{BASE_COLUMNS, DATE_COLUMN, SYMBOL_COLUMN};
use factorlab_core::families::FINANCIAL_COLUMNS;
use factorlab_core::{Frame, MergeTier};

use crate::config::{OutputConfig, OutputFormat};
use crate::symbol_task::FamilyFailure;
use crate::universe::{RunStats, SymbolFailure, UniverseReport};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label file {path}: {message}")]
    Labels { path: String, message: String },

    #[error("nothing to export: the table is empty")]
    Empty,
}

impl ExportError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

// ── Labels ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct LabelFile {
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// Human-readable column descriptions for the optional CSV label row.
///
/// Explicit entries win; otherwise a family prefix rule applies; otherwise
/// the label is the column name itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
    overrides: BTreeMap<String, String>,
}

impl LabelMap {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }

    /// Parse a TOML file with a `[labels]` table.
    pub fn from_file(path: &Path) -> Result<Self, ExportError> {
        let content = fs::read_to_string(path).map_err(|e| ExportError::io(path, e))?;
        Self::from_toml(&content).map_err(|message| ExportError::Labels {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let file: LabelFile = toml::from_str(content).map_err(|e| e.to_string())?;
        Ok(Self::new(file.labels))
    }

    pub fn label(&self, column: &str) -> String {
        if let Some(label) = self.overrides.get(column) {
            return label.clone();
        }
        match column {
            "Date" => return "Trading date".into(),
            "Symbol" => return "Ticker".into(),
            "Open" => return "Open price".into(),
            "High" => return "High price".into(),
            "Low" => return "Low price".into(),
            "Close" => return "Close price".into(),
            "Volume" => return "Volume".into(),
            _ => {}
        }
        if let Some(rest) = column.strip_prefix("ALPHA158_") {
            return format!("Alpha158 {rest}");
        }
        if let Some(rest) = column.strip_prefix("ALPHA360_") {
            return format!("Alpha360 {rest}");
        }
        if let Some(rest) = column.strip_prefix("CDL") {
            return format!("Candlestick pattern {rest}");
        }
        if let Some(rest) = column.strip_prefix("turnover_c") {
            return format!("Cumulative turnover {rest}");
        }
        if let Some(rest) = column.strip_prefix("turnover_m") {
            return format!("Mean turnover {rest}");
        }
        column.to_string()
    }
}

// ── Column summary ──────────────────────────────────────────────────

/// Family group a column name belongs to, judged by its name alone.
pub fn column_group(name: &str) -> &'static str {
    if name == DATE_COLUMN || name == SYMBOL_COLUMN || BASE_COLUMNS.contains(&name) {
        "Base"
    } else if name.starts_with("ALPHA158_") {
        "Alpha158"
    } else if name.starts_with("ALPHA360_") {
        "Alpha360"
    } else if name.starts_with("CDL") {
        "Candlestick"
    } else if FINANCIAL_COLUMNS.contains(&name) {
        "Financial"
    } else if name.contains("Volatility") || name.contains("SemiDeviation") {
        "Volatility"
    } else {
        "Technical"
    }
}

/// Indicator count per family group; key columns are not counted.
pub fn summarize_columns(frame: &Frame) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for name in frame.column_names() {
        *summary.entry(column_group(name).to_string()).or_insert(0) += 1;
    }
    summary
}

// ── Writers ─────────────────────────────────────────────────────────

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_value(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

/// CSV with a header row, an optional label row, then one row per
/// (symbol, date).
pub fn write_csv(frame: &Frame, path: &Path, labels: Option<&LabelMap>) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    let header = frame.header();
    writer.write_record(&header)?;
    if let Some(labels) = labels {
        writer.write_record(header.iter().map(|name| labels.label(name)))?;
    }

    let columns = frame.columns();
    let mut record = Vec::with_capacity(header.len());
    for row in 0..frame.rows() {
        record.clear();
        record.push(format_date(frame.dates()[row]));
        record.push(frame.symbols()[row].clone());
        record.extend(columns.iter().map(|c| format_value(c.values[row])));
        writer.write_record(&record)?;
    }
    writer.flush().map_err(|e| ExportError::io(path, e))?;
    Ok(())
}

fn to_dataframe(frame: &Frame) -> Result<DataFrame, ExportError> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let days: Vec<i32> = frame
        .dates()
        .iter()
        .map(|d| (*d - epoch).num_days() as i32)
        .collect();

    let mut columns = Vec::with_capacity(frame.width() + 2);
    columns.push(polars::prelude::Column::new(DATE_COLUMN.into(), days).cast(&DataType::Date)?);
    columns.push(polars::prelude::Column::new(
        SYMBOL_COLUMN.into(),
        frame.symbols().to_vec(),
    ));
    for column in frame.columns() {
        let values: Vec<Option<f64>> = column
            .values
            .iter()
            .map(|v| v.is_finite().then_some(*v))
            .collect();
        columns.push(polars::prelude::Column::new(column.name.as_str().into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Parquet with a `Date` date column, a `Symbol` string column and nullable
/// f64 indicator columns.
pub fn write_parquet(frame: &Frame, path: &Path) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let mut df = to_dataframe(frame)?;
    let file = fs::File::create(path).map_err(|e| ExportError::io(path, e))?;
    ParquetWriter::new(file).finish(&mut df)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))
        }
        _ => Ok(()),
    }
}

// ── Manifest ────────────────────────────────────────────────────────

/// Run metadata written next to the exported table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub generated_at: String,
    pub config_hash: String,
    pub table: PathBuf,
    pub format: OutputFormat,
    pub rows: usize,
    pub columns: usize,
    pub symbols: usize,
    pub merge_tier: Option<MergeTier>,
    pub degraded: bool,
    pub duplicate_rows_removed: usize,
    pub dropped_columns: Vec<String>,
    pub stats: RunStats,
    pub failures: Vec<SymbolFailure>,
    pub family_failures: Vec<FamilyFailure>,
    pub column_summary: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
}

impl RunManifest {
    pub fn from_report(report: &UniverseReport, table: &Path, format: OutputFormat, config_hash: &str) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            config_hash: config_hash.to_string(),
            table: table.to_path_buf(),
            format,
            rows: report.table.rows(),
            columns: report.table.header().len(),
            symbols: report.table.distinct_symbols().len(),
            merge_tier: report.merge_tier,
            degraded: report.degraded,
            duplicate_rows_removed: report.duplicate_rows_removed,
            dropped_columns: report.dropped_columns.clone(),
            stats: report.stats,
            failures: report.failures.clone(),
            family_failures: report.family_failures.clone(),
            column_summary: summarize_columns(&report.table),
            elapsed_ms: report.elapsed.as_millis() as u64,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), ExportError> {
        ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| ExportError::io(path, e))
    }
}

/// `<table>.manifest.json`.
pub fn manifest_path(table: &Path) -> PathBuf {
    let mut name = table.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".manifest.json");
    table.with_file_name(name)
}

/// Files produced by `export`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exported {
    pub table: PathBuf,
    pub manifest: Option<PathBuf>,
    pub column_summary: BTreeMap<String, usize>,
}

/// Write the report's table (and manifest) as `output` describes.
pub fn export(report: &UniverseReport, output: &OutputConfig, config_hash: &str) -> Result<Exported, ExportError> {
    if report.table.is_empty() {
        return Err(ExportError::Empty);
    }
    let mut frame = report.table.clone();
    if output.sort_rows {
        frame.sort_rows();
    }

    match output.format {
        OutputFormat::Csv => {
            let labels = match (&output.labels, output.label_row) {
                (Some(path), true) => Some(LabelMap::from_file(path)?),
                (None, true) => Some(LabelMap::default()),
                (_, false) => None,
            };
            write_csv(&frame, &output.path, labels.as_ref())?;
        }
        OutputFormat::Parquet => write_parquet(&frame, &output.path)?,
    }

    let column_summary = summarize_columns(&frame);
    for (group, count) in &column_summary {
        info!(group = %group, columns = count, "indicator columns");
    }
    info!(
        path = %output.path.display(),
        format = output.format.extension(),
        rows = frame.rows(),
        indicators = column_summary.iter().filter(|(g, _)| g.as_str() != "Base").map(|(_, n)| n).sum::<usize>(),
        "table written"
    );

    let manifest = if output.manifest {
        let path = manifest_path(&output.path);
        RunManifest::from_report(report, &output.path, output.format, config_hash).write(&path)?;
        Some(path)
    } else {
        None
    };

    Ok(Exported {
        table: output.path.clone(),
        manifest,
        column_summary,
    })
}
