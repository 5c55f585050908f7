//! Format dispatch for reading and writing datasets.
//!
//! A path's extension selects the accessor: `.zarr` directories go through
//! [`ZarrStore`](crate::zarr::ZarrStore), `.h5ad` files through
//! [`H5adStore`](crate::h5ad::H5adStore). Anything else is rejected rather
//! than guessed at.

use std::path::{Path, PathBuf};

use log::{debug, info};
use scmerge_core::{Result, ScmergeError, Summarizable};

use crate::config::WriteOptions;
use crate::dataset::Dataset;

/// Top-level elements carried by [`Dataset`]. Readers warn about and drop
/// anything else (`layers`, `obsp`, `varm`, `raw`, ...).
#[cfg(any(feature = "h5ad", feature = "zarr"))]
pub(crate) const KNOWN_ELEMENTS: [&str; 5] = ["X", "obs", "var", "obsm", "uns"];

/// A storage format that can load, persist, and list the features of a
/// [`Dataset`].
pub trait DatasetStore {
    /// File extension (without the dot) this store writes.
    fn extension(&self) -> &'static str;

    /// Load the full dataset at `path`.
    fn read(&self, path: &Path) -> Result<Dataset>;

    /// Persist `dataset` at `path`.
    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()>;

    /// Read only the feature index; the matrix is never loaded.
    fn read_var_names(&self, path: &Path) -> Result<Vec<String>>;
}

/// On-disk dataset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    H5ad,
    Zarr,
}

impl Format {
    /// Pick the format from `path`'s extension.
    ///
    /// # Errors
    ///
    /// [`ScmergeError::Format`] for any extension other than `.h5ad` or `.zarr`.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("h5ad") => Ok(Format::H5ad),
            Some("zarr") => Ok(Format::Zarr),
            _ => Err(ScmergeError::Format(format!(
                "{}: unsupported dataset format (expected .h5ad or .zarr)",
                path.display()
            ))),
        }
    }

    /// The accessor for this format.
    pub fn store(self) -> Result<Box<dyn DatasetStore>> {
        match self {
            #[cfg(feature = "h5ad")]
            Format::H5ad => Ok(Box::new(crate::h5ad::H5adStore)),
            #[cfg(feature = "zarr")]
            Format::Zarr => Ok(Box::new(crate::zarr::ZarrStore)),
            #[allow(unreachable_patterns)]
            other => Err(ScmergeError::Storage(format!(
                "built without support for {other:?} datasets"
            ))),
        }
    }
}

/// Load the dataset at `path`, dispatching on its extension.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let dataset = Format::from_path(path)?.store()?.read(path)?;
    info!("read {}: {}", path.display(), dataset.summary());
    Ok(dataset)
}

/// Read only the feature index of the dataset at `path`.
pub fn read_var_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    Format::from_path(path)?.store()?.read_var_names(path)
}

/// Write `dataset` as `<out_dir>/<stem>.zarr`, plus `<out_dir>/<stem>.h5ad`
/// when `save_h5ad` is set. Existing outputs at those paths are replaced.
///
/// Returns the written paths, zarr first.
pub fn write_dataset(dataset: &Dataset, stem: &str, options: &WriteOptions) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&options.out_dir)?;
    debug!("writing {stem}: {}", dataset.summary());

    let mut formats = vec![Format::Zarr];
    if options.save_h5ad {
        formats.push(Format::H5ad);
    }

    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let store = format.store()?;
        let path = options
            .out_dir
            .join(format!("{stem}.{}", store.extension()));
        remove_existing(&path)?;
        store.write(dataset, &path)?;
        info!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

fn remove_existing(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
