#![allow(clippy::module_name_repetitions)]
//! Canonical file paths under the data directory.
//!
//! The root defaults to `data/` relative to the working directory and can be
//! moved with the `CRIME_STATS_DATA_DIR` environment variable.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory root.
pub const DATA_DIR_ENV_VAR: &str = "CRIME_STATS_DATA_DIR";

/// Returns the data directory root.
#[must_use]
pub fn data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV_VAR) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("data"),
    }
}

/// Returns the default raw CSV export path.
#[must_use]
pub fn raw_csv_path() -> PathBuf {
    data_dir().join("raw").join("Crimes.csv")
}

/// Returns the `processed/` directory for cleaned outputs.
#[must_use]
pub fn processed_dir() -> PathBuf {
    data_dir().join("processed")
}

/// Returns the default cleaned dataset path.
#[must_use]
pub fn cleaned_dataset_path() -> PathBuf {
    processed_dir().join("crimes_clean.duckdb")
}

/// Returns the default directory for exported summary tables.
#[must_use]
pub fn tables_dir() -> PathBuf {
    data_dir().join("outputs").join("tables")
}

/// Returns `path` with `suffix` appended to its file name
/// (`a/b.duckdb` + `.wal` -> `a/b.duckdb.wal`).
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Removes a file if it exists.
///
/// # Errors
///
/// Returns an I/O error if the file exists but cannot be removed.
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_suffix_to_file_name() {
        assert_eq!(
            with_suffix(Path::new("data/processed/crimes_clean.duckdb"), ".wal"),
            PathBuf::from("data/processed/crimes_clean.duckdb.wal")
        );
    }

    #[test]
    fn dataset_lives_under_processed() {
        let path = cleaned_dataset_path();
        assert!(path.ends_with("processed/crimes_clean.duckdb"));
    }

    #[test]
    fn removing_missing_file_is_ok() {
        assert!(remove_if_exists(Path::new("/nonexistent/crime_stats/file")).is_ok());
    }
}
