//! Options for feature concatenation and dataset output.

use std::path::PathBuf;

/// Keep only companion-file observations where `obs[key] == value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFilter {
    /// Column in the companion file's `obs`.
    pub key: String,
    /// Label to keep, compared against the column's string form.
    pub value: String,
}

/// Configuration for [`concat_features`](crate::concat::concat_features).
#[derive(Debug, Clone)]
pub struct ConcatConfig {
    /// Provenance flag suffix for the original features (`is_<feature_name>`).
    pub feature_name: String,
    /// Provenance flag suffix for appended features. `None` uses the `obs`
    /// column for label sources and [`DEFAULT_ANNOTATION_FEATURE_NAME`] otherwise.
    pub annotation_feature_name: Option<String>,
    /// `obsm` key holding abundance estimates in a companion file.
    pub abundance_key: String,
    /// Column-name prefix after the key's first `_`-segment, stripped from
    /// companion columns (`q05` + `cell_abundance_w_sf_` + label).
    pub abundance_prefix_suffix: String,
    /// Optional row filter applied to the companion file.
    pub sample: Option<SampleFilter>,
}

/// Flag suffix for appended features from `obsm` and companion sources.
pub const DEFAULT_ANNOTATION_FEATURE_NAME: &str = "celltype";

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            feature_name: "gene".into(),
            annotation_feature_name: None,
            abundance_key: "q05_cell_abundance_w_sf".into(),
            abundance_prefix_suffix: "cell_abundance_w_sf_".into(),
            sample: None,
        }
    }
}

impl ConcatConfig {
    /// The column-name prefix stripped from companion abundance columns.
    pub fn abundance_prefix(&self) -> String {
        let head = self
            .abundance_key
            .split('_')
            .next()
            .unwrap_or_default();
        format!("{head}{}", self.abundance_prefix_suffix)
    }
}

/// Where and how [`write_dataset`](crate::accessor::write_dataset) writes.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Directory receiving `<stem>.zarr` (and `<stem>.h5ad`).
    pub out_dir: PathBuf,
    /// Also write an `.h5ad` file next to the `.zarr` store.
    pub save_h5ad: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            save_h5ad: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_abundance_prefix() {
        let cfg = ConcatConfig::default();
        assert_eq!(cfg.abundance_prefix(), "q05cell_abundance_w_sf_");
    }

    #[test]
    fn custom_abundance_prefix() {
        let cfg = ConcatConfig {
            abundance_key: "means_cell_abundance_w_sf".into(),
            ..Default::default()
        };
        assert_eq!(cfg.abundance_prefix(), "meanscell_abundance_w_sf_");
    }
}
