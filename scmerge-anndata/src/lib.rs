//! AnnData datasets and the feature-axis transforms applied to them.
//!
//! This crate provides:
//!
//! - **Data model**: [`Dataset`] (`X` + `obs`/`var`/`obsm`/`uns`), [`Table`],
//!   [`MatrixData`], and compressed [`SparseMatrix`] in CSR or CSC layout
//! - **Accessors**: `.h5ad` and `.zarr` readers/writers behind [`DatasetStore`]
//! - **Transforms**: [`reindex`] (shift integer observation ids),
//!   [`concat_features`] (append annotation features to `X`), and
//!   [`feature_intersection`] + [`apply_intersection`] (common feature axis)
//!
//! # Quick start
//!
//! ```
//! use scmerge_anndata::{reindex, ColumnData, ConcatConfig, AnnotationSource, Dataset, MatrixData, Table};
//!
//! let mut ds = Dataset::new(
//!     MatrixData::Dense(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
//!     Table::new(vec!["0".into(), "1".into()]),
//!     Table::new(vec!["g1".into(), "g2".into()]),
//! ).unwrap();
//! ds.add_obs_column("celltype", ColumnData::Strings(vec!["T".into(), "B".into()])).unwrap();
//!
//! let shifted = reindex(&ds, 1000).unwrap();
//! assert_eq!(shifted.obs_names(), &["1000", "1001"]);
//!
//! let source = AnnotationSource::parse("obs/celltype").unwrap();
//! let merged = scmerge_anndata::concat_features(&shifted, &source, &ConcatConfig::default()).unwrap();
//! assert_eq!(merged.var_names(), &["g1", "g2", "B", "T"]);
//! ```

pub mod accessor;
pub mod concat;
pub mod config;
pub mod dataset;
pub mod encode;
pub mod intersect;
pub mod matrix;
pub mod reindex;
pub mod source;
pub mod sparse;
pub mod table;
pub mod uns;
#[cfg(feature = "h5ad")]
pub mod h5ad;
#[cfg(feature = "zarr")]
pub mod zarr;

pub use accessor::{read_dataset, read_var_names, write_dataset, DatasetStore, Format};
pub use concat::{concat_features, concat_matrices};
pub use config::{ConcatConfig, SampleFilter, WriteOptions};
pub use dataset::{Dataset, Embedding, Sidecars};
pub use encode::one_hot;
pub use intersect::{apply_intersection, feature_intersection, intersect_names};
pub use matrix::MatrixData;
pub use reindex::reindex;
pub use source::{AnnotationSource, AnnotationTable};
pub use sparse::{SparseLayout, SparseMatrix};
pub use table::{ColumnData, Table};
pub use uns::UnsValue;
