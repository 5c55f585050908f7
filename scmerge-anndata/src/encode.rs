//! One-hot encoding of observation labels.

use std::collections::{BTreeSet, HashMap};

use crate::source::AnnotationTable;
use crate::table::ColumnData;

/// The ordered label set a column encodes to.
///
/// Categorical columns use their declared category order, including
/// categories no row uses. String columns use their sorted distinct
/// non-empty values; numeric columns their distinct non-NaN values in
/// ascending numeric order.
pub fn label_order(column: &ColumnData) -> Vec<String> {
    match column {
        ColumnData::Categorical { categories, .. } => categories.clone(),
        ColumnData::Numeric(v) => {
            let mut vals: Vec<f64> = v.iter().copied().filter(|x| !x.is_nan()).collect();
            vals.sort_by(f64::total_cmp);
            vals.dedup();
            vals.into_iter().map(|x| x.to_string()).collect()
        }
        other => other
            .labels()
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}

/// One-hot encode `column` into a table indexed by `index`.
///
/// Each label from [`label_order`] becomes one 0/1 column. Rows with a
/// missing label are all zero.
pub fn one_hot(index: &[String], column: &ColumnData) -> AnnotationTable {
    let labels = label_order(column);
    let position: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();

    let values = column
        .labels()
        .into_iter()
        .map(|label| {
            let mut row = vec![0.0; labels.len()];
            if let Some(&j) = label.as_deref().and_then(|l| position.get(l)) {
                row[j] = 1.0;
            }
            row
        })
        .collect();

    AnnotationTable {
        index: index.to_vec(),
        columns: labels,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn strings_sorted_labels() {
        let col = ColumnData::Strings(vec!["B".into(), "A".into(), "B".into()]);
        let t = one_hot(&ids(3), &col);
        assert_eq!(t.columns, vec!["A", "B"]);
        assert_eq!(
            t.values,
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn categorical_keeps_declared_order_and_unused() {
        let col = ColumnData::Categorical {
            codes: vec![1, 1, -1],
            categories: vec!["T".into(), "B".into(), "NK".into()],
        };
        let t = one_hot(&ids(3), &col);
        assert_eq!(t.columns, vec!["T", "B", "NK"]);
        assert_eq!(
            t.values,
            vec![vec![0.0, 1.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn numeric_labels_sorted_numerically() {
        let col = ColumnData::Numeric(vec![10.0, 2.0, f64::NAN, 2.0]);
        let t = one_hot(&ids(4), &col);
        assert_eq!(t.columns, vec!["2", "10"]);
        assert_eq!(t.values[2], vec![0.0, 0.0]);
    }

    proptest! {
        #[test]
        fn one_hot_is_deterministic_indicator(
            labels in proptest::collection::vec("[a-d]", 1..40),
        ) {
            let col = ColumnData::Strings(labels.clone());
            let first = one_hot(&ids(labels.len()), &col);
            let second = one_hot(&ids(labels.len()), &col);

            let distinct: BTreeSet<&String> = labels.iter().collect();
            prop_assert_eq!(first.columns.len(), distinct.len());
            prop_assert_eq!(&first.columns, &second.columns);
            prop_assert_eq!(&first.values, &second.values);
            for row in &first.values {
                prop_assert!(row.iter().all(|&v| v == 0.0 || v == 1.0));
                prop_assert_eq!(row.iter().sum::<f64>(), 1.0);
            }
        }
    }
}
