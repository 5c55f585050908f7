//! Read → transform → write steps behind each `scmerge` subcommand.
//!
//! Each function processes one dataset to completion before the next one is
//! touched, and writes only after its transform succeeded.

use std::path::{Path, PathBuf};

use log::info;
use scmerge_anndata::{
    apply_intersection, concat_features, feature_intersection, read_dataset, reindex,
    write_dataset, AnnotationSource, ConcatConfig, WriteOptions,
};
use scmerge_core::{Result, ScmergeError};

/// Output stem for `path`: `prefix` followed by the input's file stem.
pub fn output_stem(prefix: &str, path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            ScmergeError::InvalidInput(format!("{}: cannot derive an output name", path.display()))
        })?;
    Ok(format!("{prefix}-{stem}"))
}

/// Shift observation ids of the dataset at `path` and write `reindexed-<stem>`.
pub fn reindex_dataset(path: &Path, offset: i64, options: &WriteOptions) -> Result<Vec<PathBuf>> {
    let dataset = read_dataset(path)?;
    let reindexed = reindex(&dataset, offset)?;
    info!("reindexed {} observations by {offset}", reindexed.n_obs());
    write_dataset(&reindexed, &output_stem("reindexed", path)?, options)
}

/// Append the features addressed by `features` and write `concat-<stem>`.
pub fn concat_dataset(
    path: &Path,
    features: &str,
    config: &ConcatConfig,
    options: &WriteOptions,
) -> Result<Vec<PathBuf>> {
    let source = AnnotationSource::parse(features)?;
    let dataset = read_dataset(path)?;
    let concatenated = concat_features(&dataset, &source, config)?;
    write_dataset(&concatenated, &output_stem("concat", path)?, options)
}

/// Reindex, optionally append features, and write `reindexed-concat-<stem>`.
pub fn reindex_and_concat(
    path: &Path,
    offset: i64,
    features: Option<&str>,
    config: &ConcatConfig,
    options: &WriteOptions,
) -> Result<Vec<PathBuf>> {
    let source = features.map(AnnotationSource::parse).transpose()?;
    let dataset = read_dataset(path)?;
    let mut dataset = reindex(&dataset, offset)?;
    if let Some(source) = &source {
        dataset = concat_features(&dataset, source, config)?;
    }
    write_dataset(&dataset, &output_stem("reindexed-concat", path)?, options)
}

/// Restrict every dataset in `paths` to their shared features and write each
/// as `intersect-<stem>`.
pub fn intersect_features<P: AsRef<Path>>(
    paths: &[P],
    options: &WriteOptions,
) -> Result<Vec<PathBuf>> {
    let common = feature_intersection(paths)?;
    let mut written = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let dataset = read_dataset(path)?;
        let restricted = apply_intersection(&dataset, &common)?;
        written.extend(write_dataset(&restricted, &output_stem("intersect", path)?, options)?);
    }
    Ok(written)
}
