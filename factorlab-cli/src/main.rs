//! FactorLab CLI: compute the indicator catalogue across a symbol universe.
//!
//! Commands:
//! - `run` computes every built-in family for every symbol and exports the table
//! - `symbols` lists the universe the data source knows about
//! - `symbol <SYM>` computes one symbol and prints its report

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use factorlab_core::data::{CsvFinancialStore, FinancialStore, NoFinancials, QlibStore, SeriesSource, SyntheticSource};
use factorlab_core::families::builtin;
use factorlab_runner::{export, Orchestrator, OutputFormat, ProgressEvent, RunConfig, UniverseReport};

#[derive(Parser)]
#[command(
    name = "factorlab",
    version,
    about = "FactorLab CLI: quantitative indicator tables for a symbol universe"
)]
struct Cli {
    /// Log filter (e.g. `info`, `factorlab_runner=debug`). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute every symbol and write the reconciled table.
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Only the first N symbols of the universe.
        #[arg(long)]
        max_symbols: Option<usize>,

        /// Output file. Defaults to factorlab_indicators.<format>.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: csv or parquet.
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Write a descriptive label row under the CSV header.
        #[arg(long, default_value_t = false)]
        label_row: bool,
    },
    /// List the symbols the data source provides.
    Symbols {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Compute one symbol and print its report.
    Symbol {
        symbol: String,

        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// TOML run configuration; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// qlib-style data directory (features/, calendars/).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Financial snapshot directory (<kind>/<SYMBOL>.csv).
    #[arg(long)]
    financial_dir: Option<PathBuf>,

    /// Use N deterministic synthetic symbols instead of a data directory.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Run everything sequentially on one thread.
    #[arg(long, default_value_t = false)]
    disable_parallel: bool,

    /// Symbol pool size.
    #[arg(long)]
    max_workers: Option<usize>,
}

impl SourceArgs {
    /// File config (or defaults) with flag overrides applied.
    fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RunConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data.dir = Some(dir.clone());
        }
        if let Some(dir) = &self.financial_dir {
            config.data.financial_dir = Some(dir.clone());
        }
        if let Some(count) = self.synthetic {
            config.data.synthetic_symbols = Some(count);
        }
        if self.disable_parallel {
            config.engine.parallel = false;
        }
        if let Some(workers) = self.max_workers {
            config.engine.max_workers = workers;
        }
        config.engine.validate().context("invalid engine settings")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.log_json);

    match cli.command {
        Commands::Run {
            source,
            max_symbols,
            output,
            format,
            label_row,
        } => {
            let mut config = source.resolve()?;
            if let Some(max) = max_symbols {
                config.engine.max_symbols = Some(max);
            }
            if let Some(format) = format {
                config.output.format = format;
                if output.is_none() {
                    config.output.path = config.output.path.with_extension(format.extension());
                }
            }
            if let Some(path) = output {
                config.output.path = path;
            }
            if label_row {
                config.output.label_row = true;
            }
            run_universe_cmd(&config)
        }
        Commands::Symbols { source } => {
            let config = source.resolve()?;
            let series = open_source(&config)?;
            let symbols = series.list_symbols().context("listing symbols")?;
            for symbol in &symbols {
                println!("{symbol}");
            }
            info!(source = series.name(), count = symbols.len(), "universe listed");
            Ok(())
        }
        Commands::Symbol { symbol, source } => {
            let config = source.resolve()?;
            run_symbol_cmd(&config, &symbol)
        }
    }
}

fn init_logging(level: Option<&str>, json: bool) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn open_source(config: &RunConfig) -> Result<Arc<dyn SeriesSource>> {
    if let Some(count) = config.data.synthetic_symbols {
        return Ok(Arc::new(SyntheticSource::numbered(count, config.data.synthetic_rows)));
    }
    match &config.data.dir {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("data directory {} does not exist", dir.display());
            }
            Ok(Arc::new(QlibStore::new(dir.clone())))
        }
        None => bail!("no data source: pass --data-dir, --synthetic N, or set [data] in --config"),
    }
}

fn open_financials(config: &RunConfig) -> Result<Arc<dyn FinancialStore>> {
    match &config.data.financial_dir {
        Some(dir) => {
            let store = CsvFinancialStore::load(dir.clone())
                .with_context(|| format!("loading financial snapshots from {}", dir.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(NoFinancials)),
    }
}

fn orchestrator(config: &RunConfig) -> Result<Orchestrator> {
    let source = open_source(config)?;
    let families = builtin(open_financials(config)?);
    Ok(Orchestrator::new(config.engine.clone(), source, families)?)
}

fn run_universe_cmd(config: &RunConfig) -> Result<()> {
    let orch = orchestrator(config)?.with_progress(|event| {
        if let ProgressEvent::SymbolCompleted { symbol, rows, done, total } = event {
            info!(%symbol, rows, progress = %format!("{done}/{total}"), "symbol done");
        }
    });
    let report = orch.run_all(None).context("enumerating the universe")?;
    print_summary(&report);

    if report.is_empty() {
        warn!("no symbol produced data; nothing written");
        return Ok(());
    }
    let exported = export(&report, &config.output, &config.engine.fingerprint())
        .with_context(|| format!("writing {}", config.output.path.display()))?;
    println!("Table written to: {}", exported.table.display());
    if let Some(manifest) = exported.manifest {
        println!("Manifest:         {}", manifest.display());
    }
    Ok(())
}

fn run_symbol_cmd(config: &RunConfig, symbol: &str) -> Result<()> {
    let orch = orchestrator(config)?;
    let result = orch
        .run_symbol(symbol)
        .with_context(|| format!("computing {symbol}"))?;
    println!("{}", serde_json::to_string_pretty(&result.report)?);
    Ok(())
}

fn print_summary(report: &UniverseReport) {
    println!();
    println!("=== Universe Result ===");
    println!("Attempted:   {}", report.stats.attempted);
    println!("Succeeded:   {}", report.stats.succeeded);
    println!("Failed:      {}", report.stats.failed);
    println!("Rows:        {}", report.table.rows());
    println!("Indicators:  {}", report.table.width());
    match report.merge_tier {
        Some(tier) => println!("Merge tier:  {tier}"),
        None => println!("Merge tier:  (no data)"),
    }
    if report.degraded {
        println!("WARNING: degraded result, only the largest symbol table was kept");
    }
    if !report.dropped_columns.is_empty() {
        println!("Dropped columns: {} (not shared by every symbol)", report.dropped_columns.len());
    }
    if !report.family_failures.is_empty() {
        println!("Family failures: {}", report.family_failures.len());
    }
    for failure in &report.failures {
        println!("FAILED {} ({}): {}", failure.symbol, failure.kind, failure.message);
    }
    println!("Elapsed:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
}
