//! AnnData-like container for single-cell datasets.
//!
//! # Structure
//!
//! - `X`: primary data matrix (observations × features), dense or sparse
//! - `obs`: per-observation annotation [`Table`]
//! - `var`: per-feature annotation [`Table`]; its index order is the column order of `X`
//! - `obsm`: named [`Embedding`]s row-aligned with `obs`
//! - `uns`: unstructured metadata, passed through untouched
//!
//! Transforms take `&Dataset` and return a new value. `obs`, `obsm`, and
//! `uns` sit behind [`Arc`] so a transform that leaves them alone shares
//! them with its input instead of copying.
//!
//! # Example
//!
//! ```
//! use scmerge_anndata::{Dataset, MatrixData, Table};
//!
//! let x = MatrixData::Dense(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
//! let ds = Dataset::new(
//!     x,
//!     Table::new(vec!["0".into(), "1".into()]),
//!     Table::new(vec!["gene_a".into(), "gene_b".into()]),
//! ).unwrap();
//! assert_eq!(ds.shape(), (2, 2));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use scmerge_core::{Result, ScmergeError, Summarizable};

use crate::matrix::MatrixData;
use crate::table::{ColumnData, Table};
use crate::uns::UnsValue;

/// A multi-dimensional observation annotation (an `obsm` entry).
///
/// Stored either as a plain 2D array or as a dataframe; the latter carries
/// column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Vec<Vec<f64>>,
    columns: Option<Vec<String>>,
}

impl Embedding {
    /// A plain 2D array annotation.
    pub fn array(values: Vec<Vec<f64>>) -> Self {
        Self {
            values,
            columns: None,
        }
    }

    /// A dataframe annotation with named columns.
    pub fn frame(values: Vec<Vec<f64>>, columns: Vec<String>) -> Result<Self> {
        if let Some(row) = values.iter().find(|r| r.len() != columns.len()) {
            return Err(ScmergeError::InvalidInput(format!(
                "embedding row has {} values but {} column names",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            values,
            columns: Some(columns),
        })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.values.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns
            .as_ref()
            .map(Vec::len)
            .unwrap_or_else(|| self.values.first().map_or(0, Vec::len))
    }

    /// Row-major values.
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Stored column names, if this annotation is a dataframe.
    pub fn stored_columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Column names; positional `"0".."n-1"` for plain arrays.
    pub fn column_names(&self) -> Vec<String> {
        match &self.columns {
            Some(cols) => cols.clone(),
            None => (0..self.n_cols()).map(|i| i.to_string()).collect(),
        }
    }

    /// Subset rows to the given indices.
    pub fn subset_rows(&self, indices: &[usize]) -> Embedding {
        Embedding {
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
            columns: self.columns.clone(),
        }
    }
}

/// `obs`, `var`, and `obsm` without a primary matrix.
///
/// Companion annotation files are loaded this way so that `X` is never read.
#[derive(Debug, Clone, Default)]
pub struct Sidecars {
    pub obs: Table,
    pub var: Table,
    pub obsm: BTreeMap<String, Embedding>,
}

impl Sidecars {
    /// Keep only observations at the given indices, in order.
    pub fn subset_obs(&self, indices: &[usize]) -> Sidecars {
        Sidecars {
            obs: self.obs.subset(indices),
            var: self.var.clone(),
            obsm: self
                .obsm
                .iter()
                .map(|(k, e)| (k.clone(), e.subset_rows(indices)))
                .collect(),
        }
    }
}

/// AnnData-like container: `X` plus `obs`/`var`/`obsm`/`uns`.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: MatrixData,
    obs: Arc<Table>,
    var: Table,
    obsm: Arc<BTreeMap<String, Embedding>>,
    uns: Arc<BTreeMap<String, UnsValue>>,
}

impl Dataset {
    /// Create a dataset with empty `obsm` and `uns`.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix dimensions don't match the tables.
    pub fn new(x: MatrixData, obs: Table, var: Table) -> Result<Self> {
        Self::from_parts(
            x,
            Arc::new(obs),
            var,
            Arc::new(BTreeMap::new()),
            Arc::new(BTreeMap::new()),
        )
    }

    /// Assemble a dataset from (possibly shared) parts, checking every
    /// row/column alignment invariant.
    pub fn from_parts(
        x: MatrixData,
        obs: Arc<Table>,
        var: Table,
        obsm: Arc<BTreeMap<String, Embedding>>,
        uns: Arc<BTreeMap<String, UnsValue>>,
    ) -> Result<Self> {
        let (n_obs, n_vars) = x.shape();
        if obs.len() != n_obs {
            return Err(ScmergeError::ShapeMismatch {
                context: "obs vs X rows".into(),
                expected: n_obs,
                found: obs.len(),
            });
        }
        // A dense matrix with no rows carries no column count.
        let width_known = x.is_sparse() || n_obs > 0;
        if width_known && var.len() != n_vars {
            return Err(ScmergeError::ShapeMismatch {
                context: "var vs X columns".into(),
                expected: n_vars,
                found: var.len(),
            });
        }
        for (key, emb) in obsm.iter() {
            if emb.n_rows() != n_obs {
                return Err(ScmergeError::ShapeMismatch {
                    context: format!("obsm '{key}'"),
                    expected: n_obs,
                    found: emb.n_rows(),
                });
            }
        }
        Ok(Self {
            x,
            obs,
            var,
            obsm,
            uns,
        })
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.obs.len()
    }

    /// Number of features.
    pub fn n_vars(&self) -> usize {
        self.var.len()
    }

    /// (n_obs, n_vars).
    pub fn shape(&self) -> (usize, usize) {
        (self.n_obs(), self.n_vars())
    }

    /// Access the primary data matrix.
    pub fn x(&self) -> &MatrixData {
        &self.x
    }

    /// Per-observation table.
    pub fn obs(&self) -> &Table {
        &self.obs
    }

    /// Shared handle to the per-observation table.
    pub fn obs_shared(&self) -> Arc<Table> {
        Arc::clone(&self.obs)
    }

    /// Per-feature table.
    pub fn var(&self) -> &Table {
        &self.var
    }

    /// Observation identifiers.
    pub fn obs_names(&self) -> &[String] {
        self.obs.index()
    }

    /// Feature identifiers.
    pub fn var_names(&self) -> &[String] {
        self.var.index()
    }

    /// All observation annotations.
    pub fn obsm(&self) -> &BTreeMap<String, Embedding> {
        &self.obsm
    }

    /// Shared handle to the observation annotations.
    pub fn obsm_shared(&self) -> Arc<BTreeMap<String, Embedding>> {
        Arc::clone(&self.obsm)
    }

    /// Get an observation annotation.
    pub fn get_obsm(&self, key: &str) -> Option<&Embedding> {
        self.obsm.get(key)
    }

    /// Unstructured metadata.
    pub fn uns(&self) -> &BTreeMap<String, UnsValue> {
        &self.uns
    }

    /// Shared handle to the unstructured metadata.
    pub fn uns_shared(&self) -> Arc<BTreeMap<String, UnsValue>> {
        Arc::clone(&self.uns)
    }

    /// Get unstructured metadata.
    pub fn get_uns(&self, key: &str) -> Option<&UnsValue> {
        self.uns.get(key)
    }

    /// Add a per-observation column.
    pub fn add_obs_column(&mut self, key: &str, data: ColumnData) -> Result<()> {
        Arc::make_mut(&mut self.obs).insert(key, data)
    }

    /// Add a per-feature column.
    pub fn add_var_column(&mut self, key: &str, data: ColumnData) -> Result<()> {
        self.var.insert(key, data)
    }

    /// Add an observation annotation.
    pub fn add_obsm(&mut self, key: &str, data: Embedding) -> Result<()> {
        if data.n_rows() != self.n_obs() {
            return Err(ScmergeError::ShapeMismatch {
                context: format!("obsm '{key}'"),
                expected: self.n_obs(),
                found: data.n_rows(),
            });
        }
        Arc::make_mut(&mut self.obsm).insert(key.to_string(), data);
        Ok(())
    }

    /// Add unstructured metadata.
    pub fn add_uns(&mut self, key: &str, value: UnsValue) {
        Arc::make_mut(&mut self.uns).insert(key.to_string(), value);
    }

    /// The same dataset under a new `obs` table; everything else is shared.
    pub fn with_obs(&self, obs: Table) -> Result<Dataset> {
        Dataset::from_parts(
            self.x.clone(),
            Arc::new(obs),
            self.var.clone(),
            self.obsm_shared(),
            self.uns_shared(),
        )
    }

    /// Subset to the given feature indices, in order.
    pub fn subset_vars(&self, indices: &[usize]) -> Result<Dataset> {
        if let Some(&i) = indices.iter().find(|&&i| i >= self.n_vars()) {
            return Err(ScmergeError::InvalidInput(format!(
                "var index {} out of bounds (n_vars={})",
                i,
                self.n_vars()
            )));
        }
        Dataset::from_parts(
            self.x.select_columns(indices),
            self.obs_shared(),
            self.var.subset(indices),
            self.obsm_shared(),
            self.uns_shared(),
        )
    }
}

impl Summarizable for Dataset {
    fn summary(&self) -> String {
        format!(
            "Dataset: {} obs \u{00d7} {} vars ({}), {} obs columns, {} var columns, {} obsm, {} uns",
            self.n_obs(),
            self.n_vars(),
            match &self.x {
                MatrixData::Sparse(sm) => sm.summary(),
                MatrixData::Dense(_) => "dense".to_string(),
            },
            self.obs.n_columns(),
            self.var.n_columns(),
            self.obsm.len(),
            self.uns.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn sample_dataset() -> Dataset {
        let x = MatrixData::Dense(vec![
            vec![1.0, 2.0, 0.0],
            vec![3.0, 0.0, 4.0],
            vec![0.0, 5.0, 6.0],
        ]);
        Dataset::new(x, Table::new(names("", 3)), Table::new(names("gene_", 3))).unwrap()
    }

    #[test]
    fn basic_construction() {
        let ds = sample_dataset();
        assert_eq!(ds.n_obs(), 3);
        assert_eq!(ds.n_vars(), 3);
        assert_eq!(ds.shape(), (3, 3));
    }

    #[test]
    fn dimension_mismatch_error() {
        let x = MatrixData::Dense(vec![vec![1.0, 2.0]]);
        let result = Dataset::new(x, Table::new(names("", 2)), Table::new(names("g", 2)));
        assert!(matches!(result, Err(ScmergeError::ShapeMismatch { .. })));
    }

    #[test]
    fn empty_dense_dataset_keeps_var() {
        let ds = Dataset::new(MatrixData::Dense(vec![]), Table::new(vec![]), Table::new(names("g", 2)))
            .unwrap();
        assert_eq!(ds.shape(), (0, 2));
    }

    #[test]
    fn obsm_row_mismatch() {
        let mut ds = sample_dataset();
        let bad = Embedding::array(vec![vec![0.1]]);
        assert!(ds.add_obsm("X_pca", bad).is_err());
    }

    #[test]
    fn embedding_positional_columns() {
        let emb = Embedding::array(vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert_eq!(emb.column_names(), vec!["0", "1"]);
        let frame = Embedding::frame(vec![vec![0.1, 0.2]], vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(frame.column_names(), vec!["a", "b"]);
        assert!(Embedding::frame(vec![vec![0.1]], vec!["a".into(), "b".into()]).is_err());
    }

    #[test]
    fn with_obs_shares_obsm_and_uns() {
        let mut ds = sample_dataset();
        ds.add_obsm("X_pca", Embedding::array(vec![vec![0.0]; 3])).unwrap();
        ds.add_uns("source", "shard-a".into());
        let renamed = ds.with_obs(Table::new(names("cell_", 3))).unwrap();
        assert!(Arc::ptr_eq(&ds.obsm_shared(), &renamed.obsm_shared()));
        assert!(Arc::ptr_eq(&ds.uns_shared(), &renamed.uns_shared()));
        assert_eq!(renamed.obs_names()[0], "cell_0");
        assert_eq!(ds.obs_names()[0], "0");
    }

    #[test]
    fn add_obs_column_does_not_alias_clones() {
        let ds = sample_dataset();
        let mut other = ds.clone();
        other
            .add_obs_column("batch", ColumnData::Strings(vec!["a".into(); 3]))
            .unwrap();
        assert!(ds.obs().get("batch").is_none());
        assert!(other.obs().get("batch").is_some());
    }

    #[test]
    fn subset_vars_basic() {
        let mut ds = sample_dataset();
        ds.add_var_column("type", ColumnData::Strings(vec!["a".into(), "b".into(), "c".into()]))
            .unwrap();
        let sub = ds.subset_vars(&[2, 0]).unwrap();
        assert_eq!(sub.var_names(), &["gene_2", "gene_0"]);
        assert_eq!(sub.x().get(1, 0), 4.0);
        assert_eq!(sub.x().get(1, 1), 3.0);
        assert_eq!(
            sub.var().get("type").unwrap().as_strings().unwrap(),
            &vec!["c".to_string(), "a".to_string()]
        );
        assert!(Arc::ptr_eq(&ds.obs_shared(), &sub.obs_shared()));
    }

    #[test]
    fn subset_vars_out_of_bounds() {
        assert!(sample_dataset().subset_vars(&[0, 10]).is_err());
    }

    #[test]
    fn summary_format() {
        let s = sample_dataset().summary();
        assert!(s.contains("3 obs"));
        assert!(s.contains("3 vars"));
        assert!(s.contains("dense"));

        let sm = crate::sparse::SparseMatrix::from_dense(
            &[vec![1.0, 0.0], vec![0.0, 0.0]],
            2,
            crate::sparse::SparseLayout::Csc,
        );
        let sparse = Dataset::new(
            MatrixData::Sparse(sm),
            Table::new(names("", 2)),
            Table::new(names("g", 2)),
        )
        .unwrap();
        assert!(sparse.summary().contains("csc_matrix"));
        assert!(sparse.summary().contains("1 non-zeros"));
    }
}
