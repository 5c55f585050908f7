//! Shared primitives for the scmerge dataset tools.
//!
//! `scmerge-core` provides the foundation the other scmerge crates build on:
//!
//! - **Error types**: [`ScmergeError`] and [`Result`] for structured error handling
//! - **Traits**: [`Summarizable`] for one-line descriptions of containers

pub mod error;
pub mod traits;

pub use error::{Result, ScmergeError};
pub use traits::*;
