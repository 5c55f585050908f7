//! Annotation sources for feature concatenation.
//!
//! An annotation address names where extra per-observation features come from:
//!
//! - `obs/<column>`: one-hot encoded labels from an `obs` column
//! - `obsm/<key>`: a stored `obsm` matrix, used as-is
//! - `<path>.h5ad`: a companion file of abundance estimates (cell2location
//!   style), read without its `X`
//!
//! Each resolves to an [`AnnotationTable`] row-aligned with the primary dataset.

use std::path::{Path, PathBuf};

use log::debug;
use scmerge_core::{Result, ScmergeError};

use crate::config::{ConcatConfig, SampleFilter, DEFAULT_ANNOTATION_FEATURE_NAME};
use crate::dataset::{Dataset, Embedding, Sidecars};
use crate::encode::one_hot;

/// File extension recognised as a companion annotation file.
pub const COMPANION_EXTENSION: &str = "h5ad";

/// A dense block of new features: one row per observation, one named column
/// per new feature.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationTable {
    /// Row identifiers, in row order.
    pub index: Vec<String>,
    /// New feature identifiers, in column order.
    pub columns: Vec<String>,
    /// Row-major values.
    pub values: Vec<Vec<f64>>,
}

impl AnnotationTable {
    /// Build a table from an `obsm` entry.
    pub fn from_embedding(index: &[String], embedding: &Embedding) -> Self {
        Self {
            index: index.to_vec(),
            columns: embedding.column_names(),
            values: embedding.values().to_vec(),
        }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.values.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Strip `prefix` from every column name that starts with it.
    pub fn strip_column_prefix(mut self, prefix: &str) -> Self {
        for col in &mut self.columns {
            if let Some(rest) = col.strip_prefix(prefix) {
                *col = rest.to_string();
            }
        }
        self
    }
}

/// Where appended features come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationSource {
    /// One-hot encode the named `obs` column.
    ObsLabels(String),
    /// Use the named `obsm` entry.
    Obsm(String),
    /// Read abundance estimates from a companion `.h5ad` file.
    Companion(PathBuf),
}

impl AnnotationSource {
    /// Parse an annotation address.
    ///
    /// # Errors
    ///
    /// [`ScmergeError::UnsupportedSource`] if the address matches none of the
    /// recognised forms or names an empty column/key.
    pub fn parse(address: &str) -> Result<Self> {
        let is_companion = Path::new(address)
            .extension()
            .is_some_and(|ext| ext == COMPANION_EXTENSION);
        if is_companion {
            return Ok(AnnotationSource::Companion(PathBuf::from(address)));
        }
        if let Some(column) = address.strip_prefix("obs/").filter(|c| !c.is_empty()) {
            return Ok(AnnotationSource::ObsLabels(column.to_string()));
        }
        if let Some(key) = address.strip_prefix("obsm/").filter(|k| !k.is_empty()) {
            return Ok(AnnotationSource::Obsm(key.to_string()));
        }
        Err(ScmergeError::UnsupportedSource(format!(
            "'{address}' (expected obs/<column>, obsm/<key>, or a .{COMPANION_EXTENSION} path)"
        )))
    }

    /// The provenance flag suffix for features from this source.
    ///
    /// An explicit `config.annotation_feature_name` wins; otherwise label
    /// sources use their column name and the rest use `celltype`.
    pub fn feature_name(&self, config: &ConcatConfig) -> String {
        if let Some(name) = &config.annotation_feature_name {
            return name.clone();
        }
        match self {
            AnnotationSource::ObsLabels(column) => column.clone(),
            _ => DEFAULT_ANNOTATION_FEATURE_NAME.to_string(),
        }
    }

    /// Resolve this source against `dataset` into a row-aligned table.
    pub fn resolve(&self, dataset: &Dataset, config: &ConcatConfig) -> Result<AnnotationTable> {
        match self {
            AnnotationSource::ObsLabels(column) => {
                let col = dataset.obs().get(column).ok_or_else(|| {
                    ScmergeError::Format(format!("obs column '{column}' not found"))
                })?;
                Ok(one_hot(dataset.obs_names(), col))
            }
            AnnotationSource::Obsm(key) => {
                let emb = dataset.get_obsm(key).ok_or_else(|| {
                    ScmergeError::Format(format!("obsm key '{key}' not found"))
                })?;
                Ok(AnnotationTable::from_embedding(dataset.obs_names(), emb))
            }
            AnnotationSource::Companion(path) => {
                let sidecars = read_companion(path)?;
                companion_table(&sidecars, config, dataset.n_obs())
            }
        }
    }
}

#[cfg(feature = "h5ad")]
fn read_companion(path: &Path) -> Result<Sidecars> {
    crate::h5ad::read_h5ad_sidecars(path)
}

#[cfg(not(feature = "h5ad"))]
fn read_companion(path: &Path) -> Result<Sidecars> {
    Err(ScmergeError::Storage(format!(
        "cannot read {}: built without the `h5ad` feature",
        path.display()
    )))
}

/// Extract the abundance table from companion sidecars.
///
/// Applies the optional sample filter, takes `obsm[config.abundance_key]`,
/// strips [`ConcatConfig::abundance_prefix`] from the column names, and checks
/// the row count against `n_obs`.
pub fn companion_table(
    sidecars: &Sidecars,
    config: &ConcatConfig,
    n_obs: usize,
) -> Result<AnnotationTable> {
    let filtered;
    let sidecars = match &config.sample {
        Some(filter) => {
            filtered = filter_sample(sidecars, filter)?;
            &filtered
        }
        None => sidecars,
    };

    let emb = sidecars.obsm.get(&config.abundance_key).ok_or_else(|| {
        ScmergeError::Format(format!(
            "companion file has no obsm key '{}'",
            config.abundance_key
        ))
    })?;
    let table = AnnotationTable::from_embedding(sidecars.obs.index(), emb)
        .strip_column_prefix(&config.abundance_prefix());
    debug!(
        "companion table: {} rows \u{00d7} {} columns",
        table.n_rows(),
        table.n_cols()
    );

    if table.n_rows() != n_obs {
        return Err(ScmergeError::ShapeMismatch {
            context: format!("companion obsm '{}'", config.abundance_key),
            expected: n_obs,
            found: table.n_rows(),
        });
    }
    Ok(table)
}

/// Keep observations whose `obs[filter.key]` label equals `filter.value`.
pub fn filter_sample(sidecars: &Sidecars, filter: &SampleFilter) -> Result<Sidecars> {
    let col = sidecars.obs.get(&filter.key).ok_or_else(|| {
        ScmergeError::Format(format!("companion obs column '{}' not found", filter.key))
    })?;
    let keep: Vec<usize> = col
        .labels()
        .iter()
        .enumerate()
        .filter(|(_, label)| label.as_deref() == Some(filter.value.as_str()))
        .map(|(i, _)| i)
        .collect();
    debug!(
        "sample filter {}={} kept {} of {} observations",
        filter.key,
        filter.value,
        keep.len(),
        sidecars.obs.len()
    );
    Ok(sidecars.subset_obs(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixData;
    use crate::table::{ColumnData, Table};

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn companion() -> Sidecars {
        let mut obs = Table::new(ids(&["s1", "s2", "s3"]));
        obs.insert(
            "sample",
            ColumnData::Categorical {
                codes: vec![0, 1, 0],
                categories: ids(&["A", "B"]),
            },
        )
        .unwrap();
        let mut sidecars = Sidecars {
            obs,
            ..Default::default()
        };
        sidecars.obsm.insert(
            "q05_cell_abundance_w_sf".into(),
            Embedding::frame(
                vec![vec![0.1, 0.9], vec![0.5, 0.5], vec![0.7, 0.3]],
                ids(&["q05cell_abundance_w_sf_Astro", "q05cell_abundance_w_sf_Neuron"]),
            )
            .unwrap(),
        );
        sidecars
    }

    #[test]
    fn parse_recognised_addresses() {
        assert_eq!(
            AnnotationSource::parse("obs/celltype").unwrap(),
            AnnotationSource::ObsLabels("celltype".into())
        );
        assert_eq!(
            AnnotationSource::parse("obsm/X_pca").unwrap(),
            AnnotationSource::Obsm("X_pca".into())
        );
        assert_eq!(
            AnnotationSource::parse("results/c2l.h5ad").unwrap(),
            AnnotationSource::Companion(PathBuf::from("results/c2l.h5ad"))
        );
    }

    #[test]
    fn parse_rejects_unknown_address() {
        for bad in ["var/gene", "obs/", "obsm/", "celltype", "data.zarr"] {
            assert!(
                matches!(
                    AnnotationSource::parse(bad),
                    Err(ScmergeError::UnsupportedSource(_))
                ),
                "{bad} should be unsupported"
            );
        }
    }

    #[test]
    fn feature_name_defaults() {
        let cfg = ConcatConfig::default();
        assert_eq!(AnnotationSource::ObsLabels("leiden".into()).feature_name(&cfg), "leiden");
        assert_eq!(AnnotationSource::Obsm("X_pca".into()).feature_name(&cfg), "celltype");
        let cfg = ConcatConfig {
            annotation_feature_name: Some("cluster".into()),
            ..Default::default()
        };
        assert_eq!(AnnotationSource::ObsLabels("leiden".into()).feature_name(&cfg), "cluster");
    }

    #[test]
    fn resolve_obsm_positional_columns() {
        let mut ds = Dataset::new(
            MatrixData::Dense(vec![vec![1.0], vec![2.0]]),
            Table::new(ids(&["0", "1"])),
            Table::new(ids(&["g"])),
        )
        .unwrap();
        ds.add_obsm("X_pca", Embedding::array(vec![vec![0.1, 0.2], vec![0.3, 0.4]]))
            .unwrap();
        let t = AnnotationSource::Obsm("X_pca".into())
            .resolve(&ds, &ConcatConfig::default())
            .unwrap();
        assert_eq!(t.columns, vec!["0", "1"]);
        assert_eq!(t.values[1], vec![0.3, 0.4]);
    }

    #[test]
    fn resolve_missing_obs_column_is_format_error() {
        let ds = Dataset::new(
            MatrixData::Dense(vec![vec![1.0]]),
            Table::new(ids(&["0"])),
            Table::new(ids(&["g"])),
        )
        .unwrap();
        let r = AnnotationSource::ObsLabels("celltype".into()).resolve(&ds, &ConcatConfig::default());
        assert!(matches!(r, Err(ScmergeError::Format(_))));
    }

    #[test]
    fn companion_strips_prefix() {
        let t = companion_table(&companion(), &ConcatConfig::default(), 3).unwrap();
        assert_eq!(t.columns, vec!["Astro", "Neuron"]);
        assert_eq!(t.index, ids(&["s1", "s2", "s3"]));
    }

    #[test]
    fn companion_sample_filter() {
        let cfg = ConcatConfig {
            sample: Some(SampleFilter {
                key: "sample".into(),
                value: "A".into(),
            }),
            ..Default::default()
        };
        let t = companion_table(&companion(), &cfg, 2).unwrap();
        assert_eq!(t.index, ids(&["s1", "s3"]));
        assert_eq!(t.values, vec![vec![0.1, 0.9], vec![0.7, 0.3]]);
    }

    #[test]
    fn companion_row_mismatch() {
        let r = companion_table(&companion(), &ConcatConfig::default(), 4);
        assert!(matches!(
            r,
            Err(ScmergeError::ShapeMismatch { expected: 4, found: 3, .. })
        ));
    }

    #[test]
    fn companion_missing_key_is_format_error() {
        let cfg = ConcatConfig {
            abundance_key: "means_cell_abundance_w_sf".into(),
            ..Default::default()
        };
        assert!(matches!(
            companion_table(&companion(), &cfg, 3),
            Err(ScmergeError::Format(_))
        ));
    }

    #[test]
    fn companion_missing_filter_column_is_format_error() {
        let filter = SampleFilter {
            key: "donor".into(),
            value: "A".into(),
        };
        assert!(matches!(
            filter_sample(&companion(), &filter),
            Err(ScmergeError::Format(_))
        ));
    }
}
