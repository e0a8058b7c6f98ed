//! BDD tests for the reconciliation engine.
//!
//! Each scenario feeds frames built to trigger exactly one tier:
//! - identical schemas concatenate directly
//! - overlapping schemas project onto their intersection
//! - disjoint schemas fall back to the largest single input

use chrono::{Duration, NaiveDate};
use factorlab_core::reconcile::{reconcile_rows, MergeTier, ReconcileError};
use factorlab_core::{Column, Frame};

fn frame(symbol: &str, rows: usize, names: &[&str]) -> Frame {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let dates = (0..rows).map(|i| start + Duration::days(i as i64)).collect();
    let columns = names
        .iter()
        .enumerate()
        .map(|(k, n)| Column::new(*n, (0..rows).map(|i| (i * 10 + k) as f64).collect()))
        .collect();
    Frame::new(dates, vec![symbol.to_string(); rows], columns).unwrap()
}

#[test]
fn bdd_identical_schemas_use_direct_concatenation() {
    // GIVEN two symbols with the same columns in different orders
    let a = frame("AAA", 4, &["Close", "SMA_5", "RSI_14"]);
    let b = frame("BBB", 3, &["RSI_14", "Close", "SMA_5"]);

    // WHEN they are reconciled
    let out = reconcile_rows(vec![a, b]).unwrap();

    // THEN tier 1 is chosen and every row survives
    assert_eq!(out.tier, MergeTier::Direct);
    assert!(!out.degraded);
    assert_eq!(out.frame.rows(), 7);
    assert_eq!(out.frame.rows_for("AAA"), 4);
    assert_eq!(out.frame.rows_for("BBB"), 3);

    // AND the columns come out in final order
    assert_eq!(
        out.frame.header(),
        vec!["Date", "Symbol", "Close", "RSI_14", "SMA_5"]
    );
}

#[test]
fn bdd_overlapping_schemas_project_to_intersection() {
    // GIVEN one symbol that gained an extra column and one that lost one
    let a = frame("AAA", 5, &["Close", "SMA_5", "EXTRA"]);
    let b = frame("BBB", 5, &["Close", "SMA_5"]);
    let c = frame("CCC", 2, &["SMA_5", "Close", "OTHER"]);

    // WHEN they are reconciled
    let out = reconcile_rows(vec![a, b, c]).unwrap();

    // THEN tier 2 keeps only the shared columns
    assert_eq!(out.tier, MergeTier::CommonSchema);
    assert_eq!(out.frame.column_names(), vec!["Close", "SMA_5"]);
    assert_eq!(out.frame.rows(), 12);

    // AND the dropped columns are reported
    assert_eq!(out.dropped_columns, vec!["EXTRA".to_string(), "OTHER".to_string()]);
}

#[test]
fn bdd_disjoint_schemas_keep_largest_input() {
    // GIVEN frames that share no columns at all
    let a = frame("AAA", 3, &["X"]);
    let b = frame("BBB", 9, &["Y", "Z"]);
    let c = frame("CCC", 5, &["W"]);

    // WHEN they are reconciled
    let out = reconcile_rows(vec![a, b, c]).unwrap();

    // THEN tier 3 returns the biggest frame alone, flagged degraded
    assert_eq!(out.tier, MergeTier::LargestOnly);
    assert!(out.degraded);
    assert_eq!(out.frame.rows(), 9);
    assert_eq!(out.frame.distinct_symbols(), vec!["BBB"]);
    assert_eq!(out.frame.column_names(), vec!["Y", "Z"]);
}

#[test]
fn bdd_no_rows_anywhere_is_a_typed_failure() {
    // GIVEN only empty inputs
    let inputs = vec![Frame::default(), frame("AAA", 0, &["X"])];

    // WHEN they are reconciled
    let err = reconcile_rows(inputs).unwrap_err();

    // THEN the engine reports no usable input instead of panicking
    assert_eq!(err, ReconcileError::NoUsableInput);
}

#[test]
fn bdd_exact_duplicate_rows_are_removed_after_direct_merge() {
    // GIVEN the same symbol delivered twice
    let a = frame("AAA", 6, &["Close"]);

    // WHEN both copies are reconciled
    let out = reconcile_rows(vec![a.clone(), a]).unwrap();

    // THEN one copy of each row remains
    assert_eq!(out.frame.rows(), 6);
    assert_eq!(out.duplicate_rows_removed, 6);
}
