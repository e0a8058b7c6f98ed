//! Valuation, profitability, liquidity and turnover ratios.
//!
//! Ratios come from the injected `FinancialStore` when an `info` snapshot
//! exists for the symbol. Otherwise they are estimated from price and
//! volume. Either way every column in `FINANCIAL_COLUMNS` is emitted: gaps
//! are filled with fixed defaults, or re-estimated for market cap and
//! turnover.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::data::{FinancialKind, FinancialSnapshot, FinancialStore};
use crate::domain::RawSeries;
use crate::family::{ColumnSink, FamilyContext, FamilyError, IndicatorFamily};
use crate::indicators::{
    pct_change, rolling_mean, rolling_slope, rolling_std, rolling_sum, safe_div,
};

pub const FINANCIAL_COLUMNS: [&str; 21] = [
    "PriceToBookRatio",
    "MarketCap",
    "PERatio",
    "PriceToSalesRatio",
    "ROE",
    "ROA",
    "ProfitMargins",
    "CurrentRatio",
    "QuickRatio",
    "DebtToEquity",
    "TobinsQ",
    "DailyTurnover",
    "turnover_c1d",
    "turnover_c5d",
    "turnover_c10d",
    "turnover_c20d",
    "turnover_c30d",
    "turnover_m5d",
    "turnover_m10d",
    "turnover_m20d",
    "turnover_m30d",
];

const SUM_WINDOWS: [usize; 5] = [1, 5, 10, 20, 30];
const MEAN_WINDOWS: [usize; 4] = [5, 10, 20, 30];

/// Assumed ratio of shares outstanding to average daily volume.
const SHARES_PER_VOLUME: f64 = 50.0;
const FALLBACK_VOLUME: f64 = 1_000_000.0;

/// Constant used when a ratio is neither available nor estimated.
fn default_for(column: &str) -> Option<f64> {
    Some(match column {
        "PriceToBookRatio" => 1.5,
        "PERatio" => 15.0,
        "PriceToSalesRatio" => 2.0,
        "ROE" => 0.1,
        "ROA" => 0.05,
        "ProfitMargins" => 0.08,
        "CurrentRatio" => 1.2,
        "QuickRatio" => 1.0,
        "DebtToEquity" => 0.5,
        "TobinsQ" => 1.0,
        _ => return None,
    })
}

pub struct Financial {
    store: Arc<dyn FinancialStore>,
}

impl Financial {
    pub fn new(store: Arc<dyn FinancialStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for Financial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Financial").finish_non_exhaustive()
    }
}

impl IndicatorFamily for Financial {
    fn name(&self) -> &str {
        "Financial"
    }

    fn compute(&self, ctx: &FamilyContext, sink: &mut ColumnSink<'_>) -> Result<(), FamilyError> {
        let series = ctx.series();
        let info = self
            .store
            .lookup(ctx.symbol(), FinancialKind::Info)
            .filter(|s| !s.is_empty());
        let mut sheet = match info {
            Some(info) => {
                debug!(symbol = ctx.symbol(), "using reported financial data");
                let balance = self.store.lookup(ctx.symbol(), FinancialKind::BalanceSheet);
                reported(series, info, balance)
            }
            None => {
                debug!(symbol = ctx.symbol(), "estimating financial ratios from price and volume");
                estimated(series)
            }
        };
        fill_gaps(series, &mut sheet);

        for name in FINANCIAL_COLUMNS {
            let values = sheet
                .remove(name)
                .ok_or_else(|| FamilyError::compute("Financial", format!("{name} was not produced")))?;
            sink.emit(name, values)?;
        }
        Ok(())
    }
}

type Sheet = HashMap<&'static str, Vec<f64>>;

fn constant(rows: usize, value: f64) -> Vec<f64> {
    vec![value; rows]
}

/// Ratios taken from the latest `info` and `balance_sheet` snapshots.
/// Fields the snapshots lack are left out for `fill_gaps`.
fn reported(series: &RawSeries, info: &FinancialSnapshot, balance: Option<&FinancialSnapshot>) -> Sheet {
    let rows = series.len();
    let close = series.closes();
    let mut sheet = Sheet::new();

    if let Some(pb) = info.get("priceToBook") {
        sheet.insert("PriceToBookRatio", constant(rows, pb));
    } else if let Some(book) = info.get("bookValue").filter(|b| *b > 0.0) {
        sheet.insert("PriceToBookRatio", close.iter().map(|c| c / book).collect());
    }

    if let Some(cap) = info.get("marketCap") {
        sheet.insert("MarketCap", constant(rows, cap));
    } else if let Some(shares) = info.get("sharesOutstanding").filter(|s| *s > 0.0) {
        sheet.insert("MarketCap", close.iter().map(|c| c * shares).collect());
    }

    if let Some(pe) = info.first_of(&["trailingPE", "forwardPE"]) {
        sheet.insert("PERatio", constant(rows, pe));
    }
    for (key, column) in [
        ("priceToSalesTrailing12Months", "PriceToSalesRatio"),
        ("returnOnEquity", "ROE"),
        ("returnOnAssets", "ROA"),
        ("profitMargins", "ProfitMargins"),
    ] {
        if let Some(v) = info.get(key) {
            sheet.insert(column, constant(rows, v));
        }
    }

    if let Some(balance) = balance {
        let ratio = balance.get("currentRatio").or_else(|| {
            let assets = balance.get("Total Current Assets")?;
            let liabilities = balance.get("Total Current Liabilities").filter(|l| *l > 0.0)?;
            Some(assets / liabilities)
        });
        if let Some(ratio) = ratio {
            sheet.insert("CurrentRatio", constant(rows, ratio));
        }
    }

    if let Some(quick) = info.get("quickRatio") {
        sheet.insert("QuickRatio", constant(rows, quick));
    } else if let Some(current) = sheet.get("CurrentRatio") {
        let quick = current.iter().map(|c| c * 0.8).collect();
        sheet.insert("QuickRatio", quick);
    }

    let leverage = info.get("debtToEquity").or_else(|| {
        let debt = info.get("totalDebt")?;
        let cap = info.get("marketCap").filter(|c| *c > 0.0)?;
        Some(debt / cap)
    });
    if let Some(de) = leverage {
        sheet.insert("DebtToEquity", constant(rows, de));
    }

    let tobins_q = info.get("enterpriseValue").filter(|v| *v != 0.0).and_then(|ev| {
        let assets = balance?
            .first_of(&["Total Assets", "totalAssets"])
            .filter(|a| *a > 0.0)?;
        Some(ev / assets)
    });
    if let Some(q) = tobins_q {
        sheet.insert("TobinsQ", constant(rows, q));
    }

    if let Some(shares) = info
        .first_of(&["floatShares", "sharesOutstanding"])
        .filter(|s| *s > 0.0)
    {
        insert_turnover(&mut sheet, &series.volumes(), shares);
    }
    sheet
}

/// Ratios inferred from price and volume behaviour alone.
fn estimated(series: &RawSeries) -> Sheet {
    let close = series.closes();
    let high = series.highs();
    let low = series.lows();
    let volume = series.volumes();
    let avg_volume = average_positive_volume(&volume);
    let shares = avg_volume * SHARES_PER_VOLUME;
    let mut sheet = Sheet::new();

    sheet.insert("MarketCap", close.iter().map(|c| c * shares).collect());

    // Coefficient of variation over 20 days, 0 during warm-up.
    let std20 = rolling_std(&close, 20, 20);
    let mean20 = rolling_mean(&close, 20, 20);
    let variation: Vec<f64> = std20
        .iter()
        .zip(&mean20)
        .map(|(s, m)| {
            let s = if s.is_nan() { 0.0 } else { *s };
            let m = if m.is_nan() { 1.0 } else { *m };
            safe_div(s, m, 0.0)
        })
        .collect();
    sheet.insert("PriceToBookRatio", variation.iter().map(|v| 1.0 + 3.0 * v).collect());

    let overall_close = crate::indicators::rolling::mean(&close);
    let pe = rolling_slope(&close, 20)
        .into_iter()
        .map(|slope| {
            let slope = if slope.is_nan() { 0.0 } else { slope };
            (15.0 + safe_div(slope, overall_close, 0.0) * 1000.0).clamp(5.0, 50.0)
        })
        .collect();
    sheet.insert("PERatio", pe);

    let activity = rolling_mean(&volume, 20, 20)
        .into_iter()
        .map(|v| {
            let v = if v.is_nan() { avg_volume } else { v };
            1.0 + 2.0 * safe_div(v, avg_volume, 1.0)
        })
        .collect();
    sheet.insert("PriceToSalesRatio", activity);

    let roe: Vec<f64> = pct_change(&close, 20)
        .into_iter()
        .map(|r| {
            let r = if r.is_finite() { r } else { 0.0 };
            (r * 4.0).clamp(-0.3, 0.5)
        })
        .collect();
    sheet.insert("ROA", roe.iter().map(|r| r * 0.6).collect());
    sheet.insert("ROE", roe);

    sheet.insert(
        "ProfitMargins",
        variation.iter().map(|v| 0.1 / (1.0 + v)).collect(),
    );

    let current: Vec<f64> = rolling_mean(&volume, 5, 5)
        .iter()
        .zip(rolling_mean(&volume, 20, 20))
        .map(|(short, long)| {
            let liquidity = if short.is_nan() || long.is_nan() {
                1.0
            } else {
                safe_div(*short, long, 1.0)
            };
            1.0 + 0.5 * liquidity
        })
        .collect();
    sheet.insert("QuickRatio", current.iter().map(|c| c * 0.8).collect());
    sheet.insert("CurrentRatio", current);

    sheet.insert("DebtToEquity", variation.iter().map(|v| 2.0 * v).collect());

    let tobins_q = close
        .iter()
        .zip(high.iter().zip(&low))
        .map(|(c, (h, l))| safe_div(h + l, 2.0 * c, 1.0))
        .collect();
    sheet.insert("TobinsQ", tobins_q);

    insert_turnover(&mut sheet, &volume, shares);
    sheet
}

fn average_positive_volume(volume: &[f64]) -> f64 {
    let positive: Vec<f64> = volume.iter().copied().filter(|v| *v > 0.0).collect();
    if positive.is_empty() {
        FALLBACK_VOLUME
    } else {
        crate::indicators::rolling::mean(&positive)
    }
}

fn insert_turnover(sheet: &mut Sheet, volume: &[f64], shares: f64) {
    let daily: Vec<f64> = volume.iter().map(|v| v / shares).collect();
    insert_turnover_windows(sheet, &daily);
    sheet.insert("DailyTurnover", daily);
}

fn insert_turnover_windows(sheet: &mut Sheet, daily: &[f64]) {
    for (w, name) in SUM_WINDOWS.iter().zip(FINANCIAL_COLUMNS[12..17].iter()) {
        sheet.insert(*name, rolling_sum(daily, *w, 1));
    }
    for (w, name) in MEAN_WINDOWS.iter().zip(FINANCIAL_COLUMNS[17..].iter()) {
        sheet.insert(*name, rolling_mean(daily, *w, 1));
    }
}

fn unusable(values: Option<&Vec<f64>>, zero_is_unusable: bool) -> bool {
    match values {
        None => true,
        Some(v) => {
            v.iter().all(|x| x.is_nan()) || (zero_is_unusable && v.iter().all(|x| *x == 0.0))
        }
    }
}

/// Guarantee every financial column is present and usable.
fn fill_gaps(series: &RawSeries, sheet: &mut Sheet) {
    let rows = series.len();
    for name in FINANCIAL_COLUMNS {
        let is_turnover = name == "DailyTurnover" || name.starts_with("turnover");
        if !unusable(sheet.get(name), is_turnover) {
            continue;
        }
        if let Some(value) = default_for(name) {
            sheet.insert(name, constant(rows, value));
        } else if name == "MarketCap" {
            let shares = average_positive_volume(&series.volumes()) * SHARES_PER_VOLUME;
            sheet.insert(name, series.closes().iter().map(|c| c * shares).collect());
        } else {
            if unusable(sheet.get("DailyTurnover"), true) {
                let shares = average_positive_volume(&series.volumes()) * SHARES_PER_VOLUME;
                let daily = series.volumes().iter().map(|v| v / shares).collect();
                sheet.insert("DailyTurnover", daily);
            }
            if let Some(daily) = sheet.get("DailyTurnover").cloned() {
                if let Some(w) = window_of(name, "turnover_c") {
                    sheet.insert(name, rolling_sum(&daily, w, 1));
                } else if let Some(w) = window_of(name, "turnover_m") {
                    sheet.insert(name, rolling_mean(&daily, w, 1));
                }
            }
        }
    }
}

/// `turnover_c20d` with prefix `turnover_c` -> 20.
fn window_of(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?.strip_suffix('d')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NoFinancials;
    use crate::family::evaluate;
    use crate::indicators::{assert_approx, make_series, DEFAULT_EPSILON};
    use crate::registry::IndicatorRegistry;

    struct OneSymbol {
        info: FinancialSnapshot,
        balance: Option<FinancialSnapshot>,
    }

    impl FinancialStore for OneSymbol {
        fn lookup(&self, _symbol: &str, kind: FinancialKind) -> Option<&FinancialSnapshot> {
            match kind {
                FinancialKind::Info => Some(&self.info),
                FinancialKind::BalanceSheet => self.balance.as_ref(),
                _ => None,
            }
        }
    }

    fn run(store: Arc<dyn FinancialStore>, rows: usize) -> crate::table::IndicatorTable {
        let ctx = FamilyContext::new(Arc::new(make_series("FIN", rows)));
        evaluate(&Financial::new(store), &ctx, &IndicatorRegistry::new()).unwrap()
    }

    #[test]
    fn estimated_path_emits_full_set() {
        let table = run(Arc::new(NoFinancials), 40);
        assert_eq!(table.names().collect::<Vec<_>>(), FINANCIAL_COLUMNS.to_vec());
        let pe = table.column("PERatio").unwrap();
        assert!(pe.iter().all(|v| (5.0..=50.0).contains(v)));
        let roe = table.column("ROE").unwrap();
        let roa = table.column("ROA").unwrap();
        assert_approx(roa[30], roe[30] * 0.6, DEFAULT_EPSILON);
        // Warm-up rows fall back to neutral values.
        assert_approx(table.column("PriceToBookRatio").unwrap()[0], 1.0, DEFAULT_EPSILON);
        assert_approx(table.column("CurrentRatio").unwrap()[0], 1.5, DEFAULT_EPSILON);
    }

    #[test]
    fn turnover_windows_accumulate() {
        let table = run(Arc::new(NoFinancials), 40);
        let daily = table.column("DailyTurnover").unwrap();
        let c5 = table.column("turnover_c5d").unwrap();
        let m5 = table.column("turnover_m5d").unwrap();
        assert_approx(table.column("turnover_c1d").unwrap()[7], daily[7], DEFAULT_EPSILON);
        assert_approx(c5[1], daily[0] + daily[1], DEFAULT_EPSILON);
        assert_approx(m5[10], c5[10] / 5.0, DEFAULT_EPSILON);
    }

    #[test]
    fn reported_values_win_and_gaps_get_defaults() {
        let info: FinancialSnapshot = [
            ("priceToBook", 3.0),
            ("trailingPE", 22.0),
            ("floatShares", 1_000.0),
        ]
        .into_iter()
        .collect();
        let balance: FinancialSnapshot = [("Total Current Assets", 300.0), ("Total Current Liabilities", 200.0)]
            .into_iter()
            .collect();
        let table = run(
            Arc::new(OneSymbol {
                info,
                balance: Some(balance),
            }),
            30,
        );
        assert_eq!(table.column("PriceToBookRatio").unwrap()[5], 3.0);
        assert_eq!(table.column("PERatio").unwrap()[5], 22.0);
        assert_approx(table.column("CurrentRatio").unwrap()[0], 1.5, DEFAULT_EPSILON);
        assert_approx(table.column("QuickRatio").unwrap()[0], 1.2, DEFAULT_EPSILON);
        assert_eq!(table.column("ROE").unwrap()[0], 0.1);
        assert_eq!(table.column("TobinsQ").unwrap()[0], 1.0);

        let series = make_series("FIN", 30);
        let volume = series.volumes();
        assert_approx(table.column("DailyTurnover").unwrap()[3], volume[3] / 1_000.0, DEFAULT_EPSILON);
        // No market cap reported: estimated from volume.
        assert!(table.column("MarketCap").unwrap().iter().all(|v| *v > 0.0));
    }

    #[test]
    fn empty_info_snapshot_means_estimate() {
        let table = run(
            Arc::new(OneSymbol {
                info: FinancialSnapshot::default(),
                balance: None,
            }),
            30,
        );
        assert_ne!(table.column("PriceToBookRatio").unwrap()[29], 1.5);
    }

    #[test]
    fn window_names_parse() {
        assert_eq!(window_of("turnover_c20d", "turnover_c"), Some(20));
        assert_eq!(window_of("turnover_m5d", "turnover_m"), Some(5));
        assert_eq!(window_of("DailyTurnover", "turnover_c"), None);
    }
}
