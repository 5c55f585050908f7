//! Compressed sparse matrix (CSR or CSC).
//!
//! [`SparseMatrix`] stores non-zero entries along a major axis: rows for
//! [`SparseLayout::Csr`], columns for [`SparseLayout::Csc`]. `indptr[i]..indptr[i + 1]`
//! is the range of `indices`/`data` belonging to major slice `i`, and `indices`
//! holds the minor-axis coordinate of each entry. This is the layout `.h5ad` and
//! `.zarr` stores use for `X`, so matrices round-trip without conversion.

use std::collections::HashMap;

use scmerge_core::{Result, ScmergeError, Summarizable};

/// Which axis a [`SparseMatrix`] compresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseLayout {
    /// Compressed sparse row.
    Csr,
    /// Compressed sparse column.
    Csc,
}

impl SparseLayout {
    /// The AnnData `encoding-type` string for this layout.
    pub fn encoding_type(self) -> &'static str {
        match self {
            SparseLayout::Csr => "csr_matrix",
            SparseLayout::Csc => "csc_matrix",
        }
    }

    /// Parse an AnnData `encoding-type` string.
    pub fn from_encoding_type(s: &str) -> Option<Self> {
        match s {
            "csr_matrix" => Some(SparseLayout::Csr),
            "csc_matrix" => Some(SparseLayout::Csc),
            _ => None,
        }
    }
}

/// A sparse matrix in compressed (CSR or CSC) format.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    layout: SparseLayout,
    data: Vec<f64>,
    indices: Vec<usize>,
    indptr: Vec<usize>,
    n_rows: usize,
    n_cols: usize,
}

impl SparseMatrix {
    /// Create an empty sparse matrix with the given dimensions.
    pub fn new(n_rows: usize, n_cols: usize, layout: SparseLayout) -> Self {
        let n_major = match layout {
            SparseLayout::Csr => n_rows,
            SparseLayout::Csc => n_cols,
        };
        Self {
            layout,
            data: Vec::new(),
            indices: Vec::new(),
            indptr: vec![0; n_major + 1],
            n_rows,
            n_cols,
        }
    }

    /// Create a sparse matrix from its compressed components.
    ///
    /// `indptr` must have one entry per major slice plus one, be
    /// non-decreasing, and end at `data.len()`. Every index must be within
    /// the minor dimension.
    pub fn from_compressed(
        layout: SparseLayout,
        data: Vec<f64>,
        indices: Vec<usize>,
        indptr: Vec<usize>,
        n_rows: usize,
        n_cols: usize,
    ) -> Result<Self> {
        let (n_major, n_minor) = match layout {
            SparseLayout::Csr => (n_rows, n_cols),
            SparseLayout::Csc => (n_cols, n_rows),
        };
        if data.len() != indices.len() {
            return Err(ScmergeError::InvalidInput(
                "sparse data and indices must have the same length".into(),
            ));
        }
        if indptr.len() != n_major + 1 {
            return Err(ScmergeError::InvalidInput(format!(
                "indptr length ({}) must be {} for a {:?} matrix of shape ({n_rows}, {n_cols})",
                indptr.len(),
                n_major + 1,
                layout
            )));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) || indptr.last() != Some(&data.len()) {
            return Err(ScmergeError::InvalidInput(
                "indptr must be non-decreasing and end at nnz".into(),
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= n_minor) {
            return Err(ScmergeError::InvalidInput(format!(
                "sparse index {bad} out of bounds for minor dimension {n_minor}"
            )));
        }
        Ok(Self {
            layout,
            data,
            indices,
            indptr,
            n_rows,
            n_cols,
        })
    }

    /// Create a sparse matrix from triplet vectors.
    ///
    /// Entries are ordered by major then minor coordinate. Duplicate
    /// coordinates are kept as separate entries.
    pub fn from_triplets(
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
        n_rows: usize,
        n_cols: usize,
        layout: SparseLayout,
    ) -> Result<Self> {
        if rows.len() != cols.len() || cols.len() != values.len() {
            return Err(ScmergeError::InvalidInput(
                "rows, cols, and values must have the same length".into(),
            ));
        }
        for (i, (&r, &c)) in rows.iter().zip(cols.iter()).enumerate() {
            if r >= n_rows || c >= n_cols {
                return Err(ScmergeError::InvalidInput(format!(
                    "triplet {i} index ({r}, {c}) out of bounds for ({n_rows}, {n_cols})"
                )));
            }
        }

        let (major, minor, n_major) = match layout {
            SparseLayout::Csr => (&rows, &cols, n_rows),
            SparseLayout::Csc => (&cols, &rows, n_cols),
        };
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by_key(|&i| (major[i], minor[i]));

        let mut data = Vec::with_capacity(values.len());
        let mut indices = Vec::with_capacity(values.len());
        let mut indptr = vec![0usize; n_major + 1];
        for &i in &order {
            data.push(values[i]);
            indices.push(minor[i]);
            indptr[major[i] + 1] += 1;
        }
        for i in 1..=n_major {
            indptr[i] += indptr[i - 1];
        }

        Ok(Self {
            layout,
            data,
            indices,
            indptr,
            n_rows,
            n_cols,
        })
    }

    /// Create a sparse matrix from dense row-major data, storing only non-zero values.
    ///
    /// `n_cols` is given explicitly so that a matrix with zero rows keeps its width.
    pub fn from_dense(rows: &[Vec<f64>], n_cols: usize, layout: SparseLayout) -> Self {
        let n_rows = rows.len();
        let mut r_idx = Vec::new();
        let mut c_idx = Vec::new();
        let mut values = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate().take(n_cols) {
                if v != 0.0 {
                    r_idx.push(r);
                    c_idx.push(c);
                    values.push(v);
                }
            }
        }
        match Self::from_triplets(r_idx, c_idx, values, n_rows, n_cols, layout) {
            Ok(m) => m,
            // Indices above are bounded by construction.
            Err(_) => Self::new(n_rows, n_cols, layout),
        }
    }

    /// The compression layout.
    pub fn layout(&self) -> SparseLayout {
        self.layout
    }

    /// (n_rows, n_cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Stored values.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Minor-axis coordinate of each stored value.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Major-axis offsets into `data`/`indices`.
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    /// Get the value at `(row, col)`. Returns 0.0 if no entry is stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.n_rows || col >= self.n_cols {
            return 0.0;
        }
        let (major, minor) = match self.layout {
            SparseLayout::Csr => (row, col),
            SparseLayout::Csc => (col, row),
        };
        let range = self.indptr[major]..self.indptr[major + 1];
        self.indices[range.clone()]
            .iter()
            .zip(&self.data[range])
            .rev()
            .find(|&(&i, _)| i == minor)
            .map_or(0.0, |(_, &v)| v)
    }

    /// Iterate over stored entries as `(row, col, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let layout = self.layout;
        self.indptr.windows(2).enumerate().flat_map(move |(major, w)| {
            (w[0]..w[1]).map(move |k| {
                let minor = self.indices[k];
                match layout {
                    SparseLayout::Csr => (major, minor, self.data[k]),
                    SparseLayout::Csc => (minor, major, self.data[k]),
                }
            })
        })
    }

    /// Convert to a dense row-major 2D vector.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.n_cols]; self.n_rows];
        for (r, c, v) in self.iter() {
            dense[r][c] = v;
        }
        dense
    }

    /// Re-compress along the other axis if `layout` differs from the current one.
    pub fn to_layout(&self, layout: SparseLayout) -> SparseMatrix {
        if layout == self.layout {
            return self.clone();
        }
        let (rows, cols, values) = self.iter().fold(
            (Vec::new(), Vec::new(), Vec::new()),
            |(mut r, mut c, mut v), (i, j, x)| {
                r.push(i);
                c.push(j);
                v.push(x);
                (r, c, v)
            },
        );
        Self::from_triplets(rows, cols, values, self.n_rows, self.n_cols, layout)
            .unwrap_or_else(|_| Self::new(self.n_rows, self.n_cols, layout))
    }

    /// Append the columns of `other` to the right of `self`.
    ///
    /// The result keeps `self`'s layout; `other` is re-compressed if needed.
    pub fn hstack(&self, other: &SparseMatrix) -> Result<SparseMatrix> {
        if self.n_rows != other.n_rows {
            return Err(ScmergeError::ShapeMismatch {
                context: "sparse hstack".into(),
                expected: self.n_rows,
                found: other.n_rows,
            });
        }
        let other = other.to_layout(self.layout);
        let n_cols = self.n_cols + other.n_cols;

        match self.layout {
            SparseLayout::Csc => {
                // Columns are the major axis: append slices and shift offsets.
                let nnz = self.nnz();
                let mut indptr = self.indptr.clone();
                indptr.extend(other.indptr.iter().skip(1).map(|&p| p + nnz));
                let mut indices = self.indices.clone();
                indices.extend_from_slice(&other.indices);
                let mut data = self.data.clone();
                data.extend_from_slice(&other.data);
                Ok(SparseMatrix {
                    layout: SparseLayout::Csc,
                    data,
                    indices,
                    indptr,
                    n_rows: self.n_rows,
                    n_cols,
                })
            }
            SparseLayout::Csr => {
                let mut data = Vec::with_capacity(self.nnz() + other.nnz());
                let mut indices = Vec::with_capacity(self.nnz() + other.nnz());
                let mut indptr = Vec::with_capacity(self.n_rows + 1);
                indptr.push(0);
                for r in 0..self.n_rows {
                    let left = self.indptr[r]..self.indptr[r + 1];
                    data.extend_from_slice(&self.data[left.clone()]);
                    indices.extend_from_slice(&self.indices[left]);
                    let right = other.indptr[r]..other.indptr[r + 1];
                    data.extend_from_slice(&other.data[right.clone()]);
                    indices.extend(other.indices[right].iter().map(|&c| c + self.n_cols));
                    indptr.push(data.len());
                }
                Ok(SparseMatrix {
                    layout: SparseLayout::Csr,
                    data,
                    indices,
                    indptr,
                    n_rows: self.n_rows,
                    n_cols,
                })
            }
        }
    }

    /// Select columns by index, in the given order. Indices must be in bounds.
    pub fn select_columns(&self, cols: &[usize]) -> SparseMatrix {
        match self.layout {
            SparseLayout::Csc => {
                let mut data = Vec::new();
                let mut indices = Vec::new();
                let mut indptr = Vec::with_capacity(cols.len() + 1);
                indptr.push(0);
                for &c in cols {
                    let range = self.indptr[c]..self.indptr[c + 1];
                    data.extend_from_slice(&self.data[range.clone()]);
                    indices.extend_from_slice(&self.indices[range]);
                    indptr.push(data.len());
                }
                SparseMatrix {
                    layout: SparseLayout::Csc,
                    data,
                    indices,
                    indptr,
                    n_rows: self.n_rows,
                    n_cols: cols.len(),
                }
            }
            SparseLayout::Csr => {
                // old column -> every position it occupies in the output
                let mut col_map: HashMap<usize, Vec<usize>> = HashMap::new();
                for (new_c, &old_c) in cols.iter().enumerate() {
                    col_map.entry(old_c).or_default().push(new_c);
                }
                let mut data = Vec::new();
                let mut indices = Vec::new();
                let mut indptr = Vec::with_capacity(self.n_rows + 1);
                indptr.push(0);
                for r in 0..self.n_rows {
                    let mut row: Vec<(usize, f64)> = Vec::new();
                    for k in self.indptr[r]..self.indptr[r + 1] {
                        if let Some(targets) = col_map.get(&self.indices[k]) {
                            row.extend(targets.iter().map(|&t| (t, self.data[k])));
                        }
                    }
                    row.sort_by_key(|&(c, _)| c);
                    for (c, v) in row {
                        indices.push(c);
                        data.push(v);
                    }
                    indptr.push(data.len());
                }
                SparseMatrix {
                    layout: SparseLayout::Csr,
                    data,
                    indices,
                    indptr,
                    n_rows: self.n_rows,
                    n_cols: cols.len(),
                }
            }
        }
    }
}

impl Summarizable for SparseMatrix {
    fn summary(&self) -> String {
        format!(
            "SparseMatrix ({}): {}\u{00d7}{}, {} non-zeros",
            self.layout.encoding_type(),
            self.n_rows,
            self.n_cols,
            self.nnz()
        )
    }
}
