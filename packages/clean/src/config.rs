//! Pipeline configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration. Paths left unset are resolved by the caller against
//! the data directory.

use std::path::{Path, PathBuf};

use crime_stats_incident_models::GeoBounds;
use serde::Deserialize;

use crate::CleanError;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV_VAR: &str = "CRIME_STATS_CONFIG";

/// Default number of rows between progress updates.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Settings for one cleaning run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Raw CSV export to read.
    pub input: Option<PathBuf>,
    /// Cleaned `DuckDB` dataset to write.
    pub output: Option<PathBuf>,
    /// Optional Parquet copy of the cleaned dataset.
    pub parquet: Option<PathBuf>,
    /// Plausibility box for coordinates.
    pub bounds: GeoBounds,
    /// Rows between progress updates while reading.
    pub progress_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            parquet: None,
            bounds: GeoBounds::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError::Config`] if the text is not a valid config.
    pub fn from_toml(text: &str) -> Result<Self, CleanError> {
        let config: Self = toml::from_str(text)?;
        if config.bounds.min_lat > config.bounds.max_lat
            || config.bounds.min_lon > config.bounds.max_lon
        {
            log::warn!(
                "Plausibility box is inverted ({:?}); every located record will be dropped",
                config.bounds
            );
        }
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CleanError> {
        log::debug!("Loading pipeline config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Loads the file named by `explicit`, falling back to the
    /// [`CONFIG_ENV_VAR`] environment variable, then to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError`] if a named file cannot be read or parsed.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, CleanError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }
}
