//! Column-wise merge of one symbol's family tables.

use std::collections::HashSet;

use tracing::debug;

use crate::table::{IndicatorTable, Resize};

/// Result of merging family tables side by side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMerge {
    pub table: IndicatorTable,
    /// Sources that were longer than the base and got cut.
    pub truncated: Vec<String>,
    /// Sources that were shorter and got NaN-padded.
    pub padded: Vec<String>,
    /// Column names dropped because an earlier source already had them.
    pub duplicates_dropped: Vec<String>,
}

/// Merge `(source, table)` pairs into one table of `base_rows` rows.
///
/// Tables are aligned to `base_rows` first (truncate or pad), then their
/// columns are appended in input order. A name seen earlier wins; later
/// copies are dropped. Empty tables contribute nothing.
pub fn merge_columns(base_rows: usize, parts: Vec<(String, IndicatorTable)>) -> ColumnMerge {
    let mut merged = ColumnMerge {
        table: IndicatorTable::empty(base_rows),
        ..ColumnMerge::default()
    };
    let mut seen = HashSet::new();

    for (source, table) in parts {
        if table.width() == 0 {
            continue;
        }
        let (table, resize) = table.resized(base_rows);
        match resize {
            Resize::Unchanged => {}
            Resize::Truncated { from } => {
                debug!(source = %source, from, to = base_rows, "truncating family output");
                merged.truncated.push(source.clone());
            }
            Resize::Padded { from } => {
                debug!(source = %source, from, to = base_rows, "padding family output");
                merged.padded.push(source.clone());
            }
        }
        for column in table.into_columns() {
            if !seen.insert(column.name.clone()) {
                merged.duplicates_dropped.push(column.name);
                continue;
            }
            // Lengths were aligned above, so push cannot fail.
            if let Err(e) = merged.table.push(column) {
                debug!(source = %source, error = %e, "dropping misaligned column");
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn table(rows: usize, names: &[(&str, f64)]) -> IndicatorTable {
        IndicatorTable::new(
            rows,
            names
                .iter()
                .map(|(n, v)| Column::new(*n, vec![*v; rows]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn aligns_and_reports() {
        let merged = merge_columns(
            5,
            vec![
                ("base".into(), table(5, &[("Close", 1.0)])),
                ("long".into(), table(8, &[("L", 2.0)])),
                ("short".into(), table(3, &[("S", 3.0)])),
            ],
        );
        assert_eq!(merged.table.rows(), 5);
        assert_eq!(merged.table.width(), 3);
        assert_eq!(merged.truncated, vec!["long"]);
        assert_eq!(merged.padded, vec!["short"]);
        let s = merged.table.column("S").unwrap();
        assert_eq!(&s[..3], &[3.0; 3]);
        assert!(s[3].is_nan() && s[4].is_nan());
    }

    #[test]
    fn first_name_wins() {
        let merged = merge_columns(
            2,
            vec![
                ("a".into(), table(2, &[("X", 1.0)])),
                ("b".into(), table(2, &[("X", 2.0), ("Y", 3.0)])),
            ],
        );
        assert_eq!(merged.table.column("X").unwrap(), &[1.0, 1.0]);
        assert_eq!(merged.duplicates_dropped, vec!["X"]);
        assert!(merged.table.contains("Y"));
    }

    #[test]
    fn empty_parts_ignored() {
        let merged = merge_columns(4, vec![("none".into(), IndicatorTable::empty(9))]);
        assert_eq!(merged.table.rows(), 4);
        assert_eq!(merged.table.width(), 0);
        assert!(merged.truncated.is_empty());
    }
}
