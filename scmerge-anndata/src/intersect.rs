//! Feature-axis intersection across datasets.
//!
//! The intersection keeps the first dataset's feature order, restricted to
//! ids every other dataset also has (the row order of an inner join keyed on
//! the feature id). Applying it to each dataset gives every output the same
//! feature axis.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::{debug, info};
use scmerge_core::{Result, ScmergeError};

use crate::accessor::read_var_names;
use crate::dataset::Dataset;

/// Read only the feature index of each dataset and intersect them.
///
/// No matrix is loaded. An empty `paths` yields an empty intersection.
pub fn feature_intersection<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    let mut indices = Vec::with_capacity(paths.len());
    for path in paths {
        let names = read_var_names(path.as_ref())?;
        debug!("{}: {} features", path.as_ref().display(), names.len());
        indices.push(names);
    }
    let common = intersect_names(&indices);
    info!(
        "{} features shared by {} datasets",
        common.len(),
        paths.len()
    );
    Ok(common)
}

/// Intersect feature-id lists, keeping the order of the first list.
///
/// A repeated id in the first list is emitted once.
pub fn intersect_names(indices: &[Vec<String>]) -> Vec<String> {
    let Some((first, rest)) = indices.split_first() else {
        return Vec::new();
    };
    let others: Vec<HashSet<&str>> = rest
        .iter()
        .map(|ids| ids.iter().map(String::as_str).collect())
        .collect();
    let mut emitted = HashSet::new();
    first
        .iter()
        .filter(|id| others.iter().all(|set| set.contains(id.as_str())))
        .filter(|id| emitted.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Select exactly the features in `feature_ids`, in that order.
///
/// # Errors
///
/// [`ScmergeError::InvalidInput`] if an id is not a feature of `dataset`.
pub fn apply_intersection(dataset: &Dataset, feature_ids: &[String]) -> Result<Dataset> {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(dataset.n_vars());
    for (i, id) in dataset.var_names().iter().enumerate() {
        position.entry(id.as_str()).or_insert(i);
    }
    let indices = feature_ids
        .iter()
        .map(|id| {
            position.get(id.as_str()).copied().ok_or_else(|| {
                ScmergeError::InvalidInput(format!("feature '{id}' not present in dataset"))
            })
        })
        .collect::<Result<Vec<usize>>>()?;
    dataset.subset_vars(&indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixData;
    use crate::sparse::{SparseLayout, SparseMatrix};
    use crate::table::Table;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn dataset(features: &[&str], sparse: bool) -> Dataset {
        let rows: Vec<Vec<f64>> = (0..2)
            .map(|r| (0..features.len()).map(|c| (r * 10 + c) as f64).collect())
            .collect();
        let x = if sparse {
            MatrixData::Sparse(SparseMatrix::from_dense(&rows, features.len(), SparseLayout::Csr))
        } else {
            MatrixData::Dense(rows)
        };
        Dataset::new(x, Table::new(ids(&["0", "1"])), Table::new(ids(features))).unwrap()
    }

    #[test]
    fn two_dataset_scenario() {
        let a = dataset(&["g1", "g2", "g3"], false);
        let b = dataset(&["g2", "g3", "g4"], true);
        let common = intersect_names(&[a.var_names().to_vec(), b.var_names().to_vec()]);
        assert_eq!(common, ids(&["g2", "g3"]));

        let a2 = apply_intersection(&a, &common).unwrap();
        let b2 = apply_intersection(&b, &common).unwrap();
        assert_eq!(a2.var_names(), b2.var_names());
        assert_eq!(a2.x().shape(), (2, 2));
        assert_eq!(b2.x().shape(), (2, 2));
        assert_eq!(a2.x().get(1, 0), 11.0);
        assert_eq!(b2.x().get(1, 0), 10.0);
    }

    #[test]
    fn order_follows_first_input() {
        let lists = vec![ids(&["c", "a", "b"]), ids(&["a", "b", "c"]), ids(&["b", "c", "a", "z"])];
        assert_eq!(intersect_names(&lists), ids(&["c", "a", "b"]));
        assert_eq!(intersect_names(&lists), intersect_names(&lists));
    }

    #[test]
    fn empty_and_single_inputs() {
        assert!(intersect_names(&[]).is_empty());
        assert_eq!(intersect_names(&[ids(&["x", "y"])]), ids(&["x", "y"]));
        assert!(intersect_names(&[ids(&["x"]), ids(&["y"])]).is_empty());
    }

    #[test]
    fn apply_reorders_columns() {
        let a = dataset(&["g1", "g2", "g3"], true);
        let out = apply_intersection(&a, &ids(&["g3", "g1"])).unwrap();
        assert_eq!(out.var_names(), &["g3", "g1"]);
        assert_eq!(out.x().to_dense_rows(), vec![vec![2.0, 0.0], vec![12.0, 10.0]]);
    }

    #[test]
    fn apply_missing_feature_fails() {
        let a = dataset(&["g1"], false);
        assert!(matches!(
            apply_intersection(&a, &ids(&["g9"])),
            Err(ScmergeError::InvalidInput(_))
        ));
    }
}
