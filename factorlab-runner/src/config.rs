//! Serializable engine and run configuration.
//!
//! `EngineConfig` is everything the orchestrator needs: parallelism,
//! pool sizes and timeouts. `RunConfig` wraps it with the data and output
//! sections a CLI run reads from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the default symbol-pool size.
pub const MAX_DEFAULT_WORKERS: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-family timeout: a fixed base plus an allowance per input row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FamilyTimeout {
    pub base_secs: u64,
    pub per_row_ms: u64,
}

impl Default for FamilyTimeout {
    fn default() -> Self {
        Self {
            base_secs: 300,
            per_row_ms: 0,
        }
    }
}

impl FamilyTimeout {
    pub fn for_rows(&self, rows: usize) -> Duration {
        Duration::from_secs(self.base_secs)
            .saturating_add(Duration::from_millis(self.per_row_ms.saturating_mul(rows as u64)))
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Run families and symbols on worker pools. When false everything runs
    /// in order on the calling thread.
    pub parallel: bool,
    /// Symbol pool size.
    pub max_workers: usize,
    /// Family pool size, further capped by `max_workers` and the family count.
    pub family_workers: usize,
    pub family_timeout: FamilyTimeout,
    pub symbol_timeout_secs: u64,
    pub max_symbols: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: default_max_workers(),
            family_workers: 6,
            family_timeout: FamilyTimeout::default(),
            symbol_timeout_secs: 600,
            max_symbols: None,
        }
    }
}

/// `min(32, available_parallelism + 4)`.
pub fn default_max_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores + 4).min(MAX_DEFAULT_WORKERS)
}

impl EngineConfig {
    /// Sequential configuration, handy for tests and debugging.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn symbol_timeout(&self) -> Duration {
        Duration::from_secs(self.symbol_timeout_secs)
    }

    /// Family pool size for `families` registered families (at least 1).
    pub fn family_pool_size(&self, families: usize) -> usize {
        self.family_workers
            .min(self.max_workers)
            .min(families)
            .max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.family_workers == 0 {
            return Err(ConfigError::Invalid("family_workers must be at least 1".into()));
        }
        if self.family_timeout.base_secs == 0 && self.family_timeout.per_row_ms == 0 {
            return Err(ConfigError::Invalid("family_timeout must be positive".into()));
        }
        if self.symbol_timeout_secs == 0 {
            return Err(ConfigError::Invalid("symbol_timeout_secs must be positive".into()));
        }
        if self.max_symbols == Some(0) {
            return Err(ConfigError::Invalid("max_symbols must be at least 1 when set".into()));
        }
        Ok(())
    }

    /// Content hash of the settings, recorded in run manifests.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}

/// Where raw series and financial snapshots come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Root of a qlib-style store (`features/`, `calendars/`).
    pub dir: Option<PathBuf>,
    /// Root of `<kind>/<SYMBOL>.csv` financial snapshots.
    pub financial_dir: Option<PathBuf>,
    /// Generate this many synthetic symbols instead of reading `dir`.
    pub synthetic_symbols: Option<usize>,
    pub synthetic_rows: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: None,
            financial_dir: None,
            synthetic_symbols: None,
            synthetic_rows: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => Err(ConfigError::Invalid(format!("unknown output format '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub format: OutputFormat,
    /// Write a descriptive label row under the CSV header.
    pub label_row: bool,
    /// TOML file of `[labels]` overriding the built-in column descriptions.
    pub labels: Option<PathBuf>,
    /// Sort rows by (Symbol, Date) before writing.
    pub sort_rows: bool,
    /// Write `<path>.manifest.json` next to the table.
    pub manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("factorlab_indicators.csv"),
            format: OutputFormat::Csv,
            label_row: false,
            labels: None,
            sort_rows: true,
            manifest: true,
        }
    }
}

/// Complete configuration of one CLI run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RunConfig {
    pub engine: EngineConfig,
    pub data: DataConfig,
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }
}
