#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Columnar storage for the cleaned incident dataset.
//!
//! The cleaned dataset is a single `DuckDB` file holding an `incidents`
//! table and a `_meta` table. It is written once per pipeline run with
//! full-replace semantics and is read-only afterwards.

pub mod dataset;
pub mod paths;

use std::path::PathBuf;

/// Errors that can occur while writing or reading the cleaned dataset.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dataset file does not exist.
    #[error("Cleaned dataset not found at {}; run the clean step first", path.display())]
    MissingDataset {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// A stored value could not be converted or violates a dataset
    /// invariant.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
