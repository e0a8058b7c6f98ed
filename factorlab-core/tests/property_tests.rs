//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. Registry dedup: each name is claimed by exactly one caller, even under threads
//! 2. Column merge length: every merged column has the base row count
//! 3. Column merge uniqueness: no name appears twice and the first source wins

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use factorlab_core::reconcile::merge_columns;
use factorlab_core::{Column, IndicatorRegistry, IndicatorTable};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["A", "B", "C", "D", "E", "F"]).prop_map(str::to_string)
}

fn arb_table() -> impl Strategy<Value = IndicatorTable> {
    (1usize..40, prop::collection::vec(arb_name(), 0..5)).prop_map(|(rows, names)| {
        let mut table = IndicatorTable::empty(rows);
        for (k, name) in names.into_iter().enumerate() {
            // Duplicate names inside one table are allowed; push never checks names.
            let _ = table.push(Column::new(name, vec![k as f64; rows]));
        }
        table
    })
}

// ── 1. Registry dedup ────────────────────────────────────────────────

proptest! {
    /// Sequential claims: exactly the first claim of each name succeeds.
    #[test]
    fn first_claim_of_each_name_wins(names in prop::collection::vec(arb_name(), 0..50)) {
        let reg = IndicatorRegistry::new();
        let mut seen = HashSet::new();
        for name in &names {
            prop_assert_eq!(reg.claim(name), seen.insert(name.clone()));
        }
        prop_assert_eq!(reg.len(), seen.len());
        prop_assert_eq!(reg.skipped().len(), 0);
    }

    /// Concurrent claims: one winner per name across all threads.
    #[test]
    fn concurrent_claims_have_one_winner_per_name(
        names in prop::collection::vec(arb_name(), 1..30),
        threads in 2usize..6,
    ) {
        let reg = Arc::new(IndicatorRegistry::new());
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let reg = Arc::clone(&reg);
                let names = names.clone();
                std::thread::spawn(move || {
                    names
                        .iter()
                        .filter(|n| reg.claim_for(&format!("family{t}"), n))
                        .cloned()
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut wins: HashMap<String, usize> = HashMap::new();
        for h in handles {
            for name in h.join().unwrap() {
                *wins.entry(name).or_default() += 1;
            }
        }
        let distinct: HashSet<&String> = names.iter().collect();
        prop_assert_eq!(wins.len(), distinct.len());
        prop_assert!(wins.values().all(|w| *w == 1));
        prop_assert_eq!(reg.skipped().len(), names.len() * threads - distinct.len());
    }
}

// ── 2/3. Column merge ────────────────────────────────────────────────

proptest! {
    #[test]
    fn merged_columns_match_base_rows(
        base in 1usize..40,
        tables in prop::collection::vec(arb_table(), 0..6),
    ) {
        let parts: Vec<(String, IndicatorTable)> = tables
            .into_iter()
            .enumerate()
            .map(|(i, t)| (format!("f{i}"), t))
            .collect();
        let merged = merge_columns(base, parts);
        prop_assert_eq!(merged.table.rows(), base);
        for column in merged.table.columns() {
            prop_assert_eq!(column.values.len(), base);
        }
    }

    #[test]
    fn merged_names_are_unique_and_first_wins(
        tables in prop::collection::vec(arb_table(), 1..6),
    ) {
        let mut first_value: HashMap<String, f64> = HashMap::new();
        for t in &tables {
            for c in t.columns() {
                first_value.entry(c.name.clone()).or_insert(c.values[0]);
            }
        }
        let parts = tables
            .into_iter()
            .enumerate()
            .map(|(i, t)| (format!("f{i}"), t))
            .collect();
        let merged = merge_columns(10, parts);

        let names: Vec<&str> = merged.table.names().collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        prop_assert_eq!(names.len(), unique.len());
        prop_assert_eq!(unique.len(), first_value.len());
        for (name, value) in first_value {
            prop_assert_eq!(merged.table.column(&name).unwrap()[0], value);
        }
    }
}
