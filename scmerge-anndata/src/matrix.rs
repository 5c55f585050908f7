//! The primary data matrix: dense rows or compressed sparse storage.

use scmerge_core::{Result, ScmergeError};

use crate::sparse::{SparseLayout, SparseMatrix};

/// The primary data matrix, either dense or sparse.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixData {
    /// Dense row-major matrix (n_obs × n_vars).
    Dense(Vec<Vec<f64>>),
    /// Compressed sparse matrix (CSR or CSC).
    Sparse(SparseMatrix),
}

impl MatrixData {
    /// (n_obs, n_vars).
    pub fn shape(&self) -> (usize, usize) {
        match self {
            MatrixData::Dense(rows) => {
                let n_obs = rows.len();
                let n_vars = rows.first().map_or(0, |r| r.len());
                (n_obs, n_vars)
            }
            MatrixData::Sparse(s) => s.shape(),
        }
    }

    /// Get a value at (obs_idx, var_idx).
    pub fn get(&self, obs: usize, var: usize) -> f64 {
        match self {
            MatrixData::Dense(rows) => {
                rows.get(obs).and_then(|r| r.get(var)).copied().unwrap_or(0.0)
            }
            MatrixData::Sparse(s) => s.get(obs, var),
        }
    }

    /// Whether the matrix uses sparse storage.
    pub fn is_sparse(&self) -> bool {
        matches!(self, MatrixData::Sparse(_))
    }

    /// Sparse layout, if sparse.
    pub fn sparse_layout(&self) -> Option<SparseLayout> {
        match self {
            MatrixData::Dense(_) => None,
            MatrixData::Sparse(s) => Some(s.layout()),
        }
    }

    /// Dense row-major copy of the matrix.
    pub fn to_dense_rows(&self) -> Vec<Vec<f64>> {
        match self {
            MatrixData::Dense(rows) => rows.clone(),
            MatrixData::Sparse(s) => s.to_dense(),
        }
    }

    /// Build a matrix from dense rows using the same representation as `self`:
    /// sparse with the same layout when `self` is sparse, dense otherwise.
    pub fn like(&self, rows: &[Vec<f64>], n_cols: usize) -> MatrixData {
        match self {
            MatrixData::Dense(_) => MatrixData::Dense(rows.to_vec()),
            MatrixData::Sparse(s) => {
                MatrixData::Sparse(SparseMatrix::from_dense(rows, n_cols, s.layout()))
            }
        }
    }

    /// Append the columns of `other` to the right of `self`.
    ///
    /// Sparse ∥ sparse stays sparse in `self`'s layout; any other pairing is
    /// concatenated densely.
    pub fn hstack(&self, other: &MatrixData) -> Result<MatrixData> {
        let (rows, _) = self.shape();
        let (other_rows, _) = other.shape();
        if rows != other_rows {
            return Err(ScmergeError::ShapeMismatch {
                context: "matrix hstack".into(),
                expected: rows,
                found: other_rows,
            });
        }
        match (self, other) {
            (MatrixData::Sparse(a), MatrixData::Sparse(b)) => Ok(MatrixData::Sparse(a.hstack(b)?)),
            _ => {
                let right = other.to_dense_rows();
                let stacked = self
                    .to_dense_rows()
                    .into_iter()
                    .zip(right)
                    .map(|(mut l, r)| {
                        l.extend(r);
                        l
                    })
                    .collect();
                Ok(MatrixData::Dense(stacked))
            }
        }
    }

    /// Select columns by index, in the given order. Indices must be in bounds.
    pub fn select_columns(&self, indices: &[usize]) -> MatrixData {
        match self {
            MatrixData::Dense(rows) => MatrixData::Dense(
                rows.iter()
                    .map(|row| indices.iter().map(|&j| row[j]).collect())
                    .collect(),
            ),
            MatrixData::Sparse(s) => MatrixData::Sparse(s.select_columns(indices)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense() -> MatrixData {
        MatrixData::Dense(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])
    }

    #[test]
    fn dense_hstack_dense() {
        let right = MatrixData::Dense(vec![vec![1.0], vec![0.0], vec![1.0]]);
        let m = dense().hstack(&right).unwrap();
        assert_eq!(
            m,
            MatrixData::Dense(vec![
                vec![1.0, 2.0, 1.0],
                vec![3.0, 4.0, 0.0],
                vec![5.0, 6.0, 1.0],
            ])
        );
    }

    #[test]
    fn like_follows_sparse_layout() {
        for layout in [SparseLayout::Csr, SparseLayout::Csc] {
            let x = MatrixData::Sparse(SparseMatrix::new(2, 2, layout));
            let block = x.like(&[vec![0.0, 1.0], vec![1.0, 0.0]], 2);
            assert_eq!(block.sparse_layout(), Some(layout));
            assert_eq!(block.get(0, 1), 1.0);
        }
        let block = dense().like(&[vec![1.0]], 1);
        assert!(!block.is_sparse());
    }

    #[test]
    fn sparse_hstack_keeps_layout() {
        let x = MatrixData::Sparse(SparseMatrix::from_dense(
            &[vec![1.0, 0.0], vec![0.0, 2.0]],
            2,
            SparseLayout::Csc,
        ));
        let block = x.like(&[vec![0.0], vec![1.0]], 1);
        let m = x.hstack(&block).unwrap();
        assert_eq!(m.sparse_layout(), Some(SparseLayout::Csc));
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.get(1, 2), 1.0);
    }

    #[test]
    fn hstack_row_mismatch() {
        let right = MatrixData::Dense(vec![vec![1.0]]);
        assert!(matches!(
            dense().hstack(&right),
            Err(ScmergeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn select_columns_dense() {
        let m = dense().select_columns(&[1]);
        assert_eq!(m, MatrixData::Dense(vec![vec![2.0], vec![4.0], vec![6.0]]));
    }
}
