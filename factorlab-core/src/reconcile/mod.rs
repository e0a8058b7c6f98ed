//! Reconciliation engine.
//!
//! Merges independently produced frames into one frame with a single column
//! schema. Strategies are tried in order and each returns a value, so every
//! tier can be exercised on its own:
//!
//! 1. `concat_direct`: all inputs share one column set; concatenate rows.
//! 2. `concat_common`: project every input onto the columns they all share,
//!    using the narrowest input as the template, then concatenate.
//! 3. `largest_only`: keep the input with the most rows, flagged degraded.
//!
//! Only an input list with no non-empty frame fails outright.

pub mod columns;

pub use columns::{merge_columns, ColumnMerge};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::table::{Frame, TableError};

/// Which strategy produced a reconciled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeTier {
    Direct,
    CommonSchema,
    LargestOnly,
}

impl std::fmt::Display for MergeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::CommonSchema => "common_schema",
            Self::LargestOnly => "largest_only",
        };
        f.write_str(s)
    }
}

/// Why a tier could not merge its inputs. Moves the engine to the next tier.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MergeStructuralError {
    #[error("input {index} schema differs: missing {missing:?}, extra {extra:?}")]
    SchemaMismatch {
        index: usize,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("inputs share no columns")]
    NoCommonColumns,

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReconcileError {
    #[error("no non-empty input to reconcile")]
    NoUsableInput,
}

/// Output of `reconcile_rows`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub frame: Frame,
    pub tier: MergeTier,
    /// True when the frame is a single input standing in for all of them.
    pub degraded: bool,
    pub duplicate_rows_removed: usize,
    /// Columns present in some inputs but absent from the result.
    pub dropped_columns: Vec<String>,
}

/// Row-wise reconcile `frames` through the tier chain.
///
/// Empty frames are ignored. The result's columns are in final order
/// (`Frame::finalize`); row order follows input order.
pub fn reconcile_rows(frames: Vec<Frame>) -> Result<Reconciled, ReconcileError> {
    let mut frames: Vec<Frame> = frames.into_iter().filter(|f| !f.is_empty()).collect();
    if frames.is_empty() {
        return Err(ReconcileError::NoUsableInput);
    }
    for frame in &mut frames {
        let dropped = frame.drop_duplicate_columns();
        if !dropped.is_empty() {
            debug!(?dropped, "dropped duplicate columns before merge");
        }
    }
    let all_names = union_of_names(&frames);

    let (mut frame, tier) = match concat_direct(&frames) {
        Ok(frame) => (frame, MergeTier::Direct),
        Err(direct_err) => {
            warn!(error = %direct_err, "direct concatenation failed, projecting to common schema");
            match concat_common(&frames) {
                Ok(frame) => (frame, MergeTier::CommonSchema),
                Err(common_err) => {
                    warn!(error = %common_err, "common-schema merge failed, keeping largest input");
                    (largest_only(frames), MergeTier::LargestOnly)
                }
            }
        }
    };

    let duplicate_rows_removed = match tier {
        MergeTier::LargestOnly => 0,
        _ => frame.dedup_rows(),
    };
    let kept: BTreeSet<&str> = frame.column_names().into_iter().collect();
    let dropped_columns = all_names
        .iter()
        .filter(|n| !kept.contains(n.as_str()))
        .cloned()
        .collect();

    Ok(Reconciled {
        frame: frame.finalize(),
        tier,
        degraded: tier == MergeTier::LargestOnly,
        duplicate_rows_removed,
        dropped_columns,
    })
}

/// Tier 1: every input has the same column set (order may differ).
pub fn concat_direct(frames: &[Frame]) -> Result<Frame, MergeStructuralError> {
    let Some(first) = frames.first() else {
        return Ok(Frame::default());
    };
    let schema: Vec<String> = first.column_names().iter().map(|s| s.to_string()).collect();
    let expected: BTreeSet<&str> = schema.iter().map(String::as_str).collect();

    for (index, frame) in frames.iter().enumerate().skip(1) {
        let actual: BTreeSet<&str> = frame.column_names().into_iter().collect();
        if actual != expected {
            return Err(MergeStructuralError::SchemaMismatch {
                index,
                missing: expected.difference(&actual).map(|s| s.to_string()).collect(),
                extra: actual.difference(&expected).map(|s| s.to_string()).collect(),
            });
        }
    }
    concat_projected(frames, &schema)
}

/// Tier 2: project onto the columns every input shares.
pub fn concat_common(frames: &[Frame]) -> Result<Frame, MergeStructuralError> {
    let Some(template) = frames.iter().min_by_key(|f| f.width()) else {
        return Ok(Frame::default());
    };
    let common: Vec<String> = template
        .column_names()
        .into_iter()
        .filter(|name| frames.iter().all(|f| f.column(name).is_some()))
        .map(str::to_string)
        .collect();
    if common.is_empty() {
        return Err(MergeStructuralError::NoCommonColumns);
    }
    concat_projected(frames, &common)
}

/// Tier 3: the input with the most rows (first on ties).
pub fn largest_only(frames: Vec<Frame>) -> Frame {
    let mut best: Option<Frame> = None;
    for frame in frames {
        let replace = best.as_ref().map_or(true, |b| frame.rows() > b.rows());
        if replace {
            best = Some(frame);
        }
    }
    best.unwrap_or_default()
}

fn concat_projected(frames: &[Frame], schema: &[String]) -> Result<Frame, MergeStructuralError> {
    let mut out = Frame::default();
    for frame in frames {
        out.append(frame.select(schema)?)?;
    }
    Ok(out)
}

fn union_of_names(frames: &[Frame]) -> BTreeSet<String> {
    frames
        .iter()
        .flat_map(|f| f.column_names())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use chrono::NaiveDate;

    fn frame(symbol: &str, rows: usize, names: &[&str]) -> Frame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..rows)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        let columns = names
            .iter()
            .map(|n| Column::new(*n, (0..rows).map(|i| i as f64).collect()))
            .collect();
        Frame::new(dates, vec![symbol.to_string(); rows], columns).unwrap()
    }

    #[test]
    fn direct_ignores_column_order() {
        let out = concat_direct(&[frame("A", 2, &["X", "Y"]), frame("B", 3, &["Y", "X"])]).unwrap();
        assert_eq!(out.rows(), 5);
        assert_eq!(out.column_names(), vec!["X", "Y"]);
    }

    #[test]
    fn direct_reports_mismatch() {
        let err = concat_direct(&[frame("A", 1, &["X"]), frame("B", 1, &["Y"])]).unwrap_err();
        assert_eq!(
            err,
            MergeStructuralError::SchemaMismatch {
                index: 1,
                missing: vec!["X".into()],
                extra: vec!["Y".into()],
            }
        );
    }

    #[test]
    fn common_uses_narrowest_template() {
        let out = concat_common(&[
            frame("A", 2, &["X", "Y", "Z"]),
            frame("B", 2, &["Y", "X"]),
        ])
        .unwrap();
        assert_eq!(out.column_names(), vec!["Y", "X"]);
        assert_eq!(out.rows(), 4);
    }

    #[test]
    fn common_fails_without_overlap() {
        assert_eq!(
            concat_common(&[frame("A", 1, &["X"]), frame("B", 1, &["Y"])]).unwrap_err(),
            MergeStructuralError::NoCommonColumns
        );
    }

    #[test]
    fn largest_prefers_first_on_tie() {
        let out = largest_only(vec![frame("A", 3, &["X"]), frame("B", 3, &["Y"]), frame("C", 2, &["Z"])]);
        assert_eq!(out.symbols()[0], "A");
    }

    #[test]
    fn empty_inputs_are_no_usable_input() {
        assert_eq!(reconcile_rows(vec![]).unwrap_err(), ReconcileError::NoUsableInput);
        assert_eq!(
            reconcile_rows(vec![Frame::default(), frame("A", 0, &["X"])]).unwrap_err(),
            ReconcileError::NoUsableInput
        );
    }

    #[test]
    fn reconcile_removes_duplicate_rows() {
        let out = reconcile_rows(vec![frame("A", 3, &["X"]), frame("A", 3, &["X"])]).unwrap();
        assert_eq!(out.tier, MergeTier::Direct);
        assert_eq!(out.frame.rows(), 3);
        assert_eq!(out.duplicate_rows_removed, 3);
    }

    #[test]
    fn reconcile_drops_in_frame_duplicates_before_tier_one() {
        let dup = Frame::new(
            vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()],
            vec!["A".into()],
            vec![Column::new("X", vec![1.0]), Column::new("X", vec![2.0])],
        )
        .unwrap();
        let out = reconcile_rows(vec![dup, frame("B", 1, &["X"])]).unwrap();
        assert_eq!(out.tier, MergeTier::Direct);
        assert_eq!(out.frame.column("X").unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn tier_names_display() {
        assert_eq!(MergeTier::CommonSchema.to_string(), "common_schema");
    }
}
