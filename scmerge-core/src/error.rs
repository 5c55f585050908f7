//! Structured error types for scmerge.

use thiserror::Error;

/// Unified error type for all scmerge operations.
#[derive(Debug, Error)]
pub enum ScmergeError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed content: a non-integer observation id, or a required field
    /// absent from an annotation file.
    #[error("format error: {0}")]
    Format(String),

    /// Row-count disagreement between a dataset and an annotation source.
    #[error("shape mismatch in {context}: expected {expected} rows, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// An annotation address matching none of `obs/`, `obsm/`, or a companion file.
    #[error("unsupported annotation source: {0}")]
    UnsupportedSource(String),

    /// Invalid input (bad arguments, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Failure reported by the HDF5 or Zarr backend.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience alias used throughout scmerge.
pub type Result<T> = std::result::Result<T, ScmergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_message() {
        let e = ScmergeError::ShapeMismatch {
            context: "obsm 'q05'".into(),
            expected: 3,
            found: 2,
        };
        assert_eq!(
            e.to_string(),
            "shape mismatch in obsm 'q05': expected 3 rows, found 2"
        );
    }

    #[test]
    fn io_error_converts() {
        fn open() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(ScmergeError::Io(_))));
    }
}
