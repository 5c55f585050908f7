//! Shift integer observation identifiers so shards can be merged without collision.

use log::debug;
use scmerge_core::{Result, ScmergeError};

use crate::dataset::Dataset;

/// Return a copy of `dataset` whose observation ids are `id + offset`.
///
/// Every id must parse as an `i64`. Row order, `X`, `var`, `obsm`, and `uns`
/// are unchanged; `obsm` and `uns` are shared with the input.
///
/// # Errors
///
/// [`ScmergeError::Format`] if an id is not integer-like or the shifted id
/// overflows.
pub fn reindex(dataset: &Dataset, offset: i64) -> Result<Dataset> {
    let index = shift_ids(dataset.obs_names(), offset)?;
    debug!(
        "reindexed {} observations by {offset}",
        dataset.n_obs()
    );
    let obs = dataset.obs().with_index(index)?;
    dataset.with_obs(obs)
}

/// Shift each id by `offset`, rendering the result back to a string.
pub fn shift_ids(ids: &[String], offset: i64) -> Result<Vec<String>> {
    ids.iter()
        .map(|id| {
            let n: i64 = id.trim().parse().map_err(|_| {
                ScmergeError::Format(format!("observation id '{id}' is not an integer"))
            })?;
            n.checked_add(offset)
                .map(|v| v.to_string())
                .ok_or_else(|| {
                    ScmergeError::Format(format!("observation id '{id}' + {offset} overflows"))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixData;
    use crate::table::{ColumnData, Table};
    use proptest::prelude::*;

    fn dataset_with_ids(ids: &[&str]) -> Dataset {
        let x = MatrixData::Dense(ids.iter().map(|_| vec![1.0]).collect());
        let mut obs = Table::new(ids.iter().map(|s| s.to_string()).collect());
        obs.insert(
            "batch",
            ColumnData::Strings(ids.iter().map(|_| "b1".to_string()).collect()),
        )
        .unwrap();
        Dataset::new(x, obs, Table::new(vec!["g".into()])).unwrap()
    }

    #[test]
    fn offset_thousand() {
        let ds = dataset_with_ids(&["0", "1", "2"]);
        let out = reindex(&ds, 1000).unwrap();
        assert_eq!(out.obs_names(), &["1000", "1001", "1002"]);
        assert_eq!(out.obs().get("batch"), ds.obs().get("batch"));
        assert_eq!(out.x(), ds.x());
        // input untouched
        assert_eq!(ds.obs_names(), &["0", "1", "2"]);
    }

    #[test]
    fn negative_offset() {
        let ds = dataset_with_ids(&["5", "10"]);
        let out = reindex(&ds, -5).unwrap();
        assert_eq!(out.obs_names(), &["0", "5"]);
    }

    #[test]
    fn non_integer_id_is_format_error() {
        let ds = dataset_with_ids(&["0", "AAACCTG-1"]);
        assert!(matches!(reindex(&ds, 1), Err(ScmergeError::Format(_))));
    }

    #[test]
    fn overflow_is_format_error() {
        let ids = vec![i64::MAX.to_string()];
        assert!(matches!(shift_ids(&ids, 1), Err(ScmergeError::Format(_))));
    }

    proptest! {
        #[test]
        fn reindex_is_invertible(
            ids in proptest::collection::vec(-1_000_000i64..1_000_000, 0..50),
            k in -1_000_000i64..1_000_000,
        ) {
            let ids: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
            let there = shift_ids(&ids, k).unwrap();
            let back = shift_ids(&there, -k).unwrap();
            prop_assert_eq!(back, ids);
        }
    }
}
