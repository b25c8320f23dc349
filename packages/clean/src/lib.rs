#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cleaning pipeline for raw incident exports.
//!
//! raw CSV rows -> [`normalize`] -> [`validate`] -> [`features`] -> cleaned
//! [`Incident`]s ready for materialization.
//!
//! Malformed data fails soft: unparseable fields become null and invalid
//! rows are dropped and counted. Only I/O and schema problems are errors.

pub mod config;
pub mod features;
pub mod normalize;
pub mod progress;
pub mod validate;

use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use crime_stats_incident_models::{GeoBounds, Incident, NormalizedIncident};
use csv::{ByteRecord, ReaderBuilder};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::normalize::{ColumnMap, RawRow, normalize_row};
use crate::progress::ProgressCallback;
use crate::validate::ValidationReport;

/// Errors that abort a cleaning run.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    /// Reading the input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV reader hit an unrecoverable error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The raw header lacks a column every record needs.
    #[error("Schema error: required column {column:?} not found in header")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// The pipeline configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Summary of a cleaning run, suitable for operator reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanReport {
    /// Data rows read from the input (excluding the header).
    pub raw_rows: usize,
    /// Rows the CSV reader could not decode at all.
    pub unreadable_rows: usize,
    /// Per-step validation counts.
    pub validation: ValidationReport,
    /// Earliest `occurred_at` in the cleaned output.
    pub min_occurred_at: Option<NaiveDateTime>,
    /// Latest `occurred_at` in the cleaned output.
    pub max_occurred_at: Option<NaiveDateTime>,
}

impl CleanReport {
    /// Rows in the cleaned output.
    #[must_use]
    pub const fn clean_rows(&self) -> usize {
        self.validation.output_rows
    }
}

/// Cleaned records plus the report describing how they were obtained.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub incidents: Vec<Incident>,
    pub report: CleanReport,
}

/// Reads and normalizes every row of a raw CSV export.
///
/// Returns the normalized records along with the raw row count and the
/// number of rows the reader could not decode.
///
/// # Errors
///
/// Returns [`CleanError`] on I/O failure or if the header is missing a
/// required column.
pub fn read_normalized<R: Read>(
    reader: R,
    progress_interval: u64,
    progress: &dyn ProgressCallback,
) -> Result<(Vec<NormalizedIncident>, usize, usize), CleanError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = ColumnMap::from_headers(rdr.byte_headers()?)?;

    let interval = progress_interval.max(1);
    let mut record = ByteRecord::new();
    let mut normalized = Vec::new();
    let mut raw_rows = 0usize;
    let mut unreadable = 0usize;
    let mut since_tick = 0u64;

    progress.set_message("Reading raw rows".to_string());

    loop {
        match rdr.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                raw_rows += 1;
                normalized.push(normalize_row(&RawRow::new(&columns, &record)));
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                raw_rows += 1;
                unreadable += 1;
                log::debug!("Skipping unreadable row: {e}");
            }
        }

        since_tick += 1;
        if since_tick == interval {
            progress.inc(since_tick);
            since_tick = 0;
        }
    }

    progress.inc(since_tick);
    progress.finish(format!("Read {raw_rows} raw rows"));

    log::info!("Raw rows: {raw_rows}");
    if unreadable > 0 {
        log::warn!("Skipped {unreadable} unreadable rows");
    }

    Ok((normalized, raw_rows, unreadable))
}

/// Validates normalized records and derives their time features.
#[must_use]
pub fn clean_normalized(
    records: Vec<NormalizedIncident>,
    bounds: &GeoBounds,
) -> (Vec<Incident>, ValidationReport) {
    let (validated, report) = validate::validate(records, bounds);
    (features::derive_features(validated), report)
}

/// Runs the full cleaning pipeline over a CSV reader.
///
/// # Errors
///
/// Returns [`CleanError`] on I/O failure or a schema error in the header.
pub fn clean_reader<R: Read>(
    reader: R,
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Result<CleanOutput, CleanError> {
    let (normalized, raw_rows, unreadable_rows) =
        read_normalized(reader, config.progress_interval, progress)?;
    let (incidents, validation) = clean_normalized(normalized, &config.bounds);

    let report = CleanReport {
        raw_rows,
        unreadable_rows,
        validation,
        min_occurred_at: incidents.iter().map(|i| i.occurred_at).min(),
        max_occurred_at: incidents.iter().map(|i| i.occurred_at).max(),
    };

    log::info!("Clean rows: {}", report.clean_rows());
    if let (Some(min), Some(max)) = (report.min_occurred_at, report.max_occurred_at) {
        log::info!("Date range: {min} -> {max}");
    }

    Ok(CleanOutput { incidents, report })
}

/// Runs the full cleaning pipeline over a CSV file.
///
/// # Errors
///
/// Returns [`CleanError`] if the file cannot be opened or read, or its
/// header is missing a required column.
pub fn clean_file(
    path: &Path,
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Result<CleanOutput, CleanError> {
    log::info!("Loading: {}", path.display());
    let file = std::fs::File::open(path)?;
    clean_reader(std::io::BufReader::new(file), config, progress)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crime_stats_incident_models::Weekday;

    use super::*;
    use crate::progress::NullProgress;

    const SCENARIO: &str = "\
 ID ,Date,Primary Type,Arrest,Domestic,District,Latitude,Longitude,Updated On
100,01/15/2024 02:30:00 PM,THEFT,true,false,12,41.88,-87.63,01/20/2024 03:00:00 PM
100,01/16/2024 09:00:00 AM,BATTERY,false,true,12,41.88,-87.63,
101,not a date,THEFT,false,false,3,41.75,-87.60,
102,01/17/2024 11:00:00 PM,ROBBERY,false,false,7,50.0,-87.60,
103,01/18/2024 12:00:00 AM,NARCOTICS,true,false,,,,
";

    fn run(csv: &str) -> CleanOutput {
        clean_reader(csv.as_bytes(), &PipelineConfig::default(), &NullProgress).unwrap()
    }

    #[test]
    fn scenario_counts_and_survivors() {
        let output = run(SCENARIO);
        let report = &output.report;

        assert_eq!(report.raw_rows, 5);
        assert_eq!(report.unreadable_rows, 0);
        assert_eq!(report.validation.bad_dates, 1);
        assert_eq!(report.validation.implausible_coordinates, 1);
        assert_eq!(report.validation.duplicates, 1);
        assert_eq!(report.clean_rows(), 2);

        let by_id: BTreeMap<&str, &Incident> =
            output.incidents.iter().map(|i| (i.id.as_str(), i)).collect();
        assert_eq!(by_id.len(), 2);
        let first = by_id["100"];
        assert_eq!(first.details.category.as_deref(), Some("THEFT"));
        assert_eq!(first.time.hour(), 14);
        assert_eq!(first.time.weekday(), Weekday::Monday);
        assert!(first.details.updated_at.is_some());

        let unlocated = by_id["103"];
        assert_eq!(unlocated.details.coordinates(), None);
        assert_eq!(unlocated.time.hour(), 0);
    }

    #[test]
    fn unstorable_years_count_as_bad_dates() {
        let output = run("\
ID,Date,Primary Type
1,0000-03-01 10:00:00,THEFT
2,2024-03-01 10:00:00,THEFT
");
        assert_eq!(output.report.validation.bad_dates, 1);
        assert_eq!(output.report.clean_rows(), 1);
        assert_eq!(output.incidents[0].id, "2");
    }

    #[test]
    fn reports_observed_date_range() {
        let output = run(SCENARIO);
        let min = output.report.min_occurred_at.unwrap();
        let max = output.report.max_occurred_at.unwrap();
        assert_eq!(min.to_string(), "2024-01-15 14:30:00");
        assert_eq!(max.to_string(), "2024-01-18 00:00:00");
    }

    #[test]
    fn geo_invariant_holds_for_output() {
        let bounds = GeoBounds::default();
        for incident in run(SCENARIO).incidents {
            if let Some((lat, lon)) = incident.details.coordinates() {
                assert!(bounds.contains(lat, lon));
            }
        }
    }

    #[test]
    fn ragged_rows_do_not_abort() {
        let csv = "ID,Date,Primary Type\n1,2020-01-01 10:00:00\n2,2020-01-02 11:00:00,THEFT,extra\n";
        let output = run(csv);
        assert_eq!(output.report.raw_rows, 2);
        assert_eq!(output.incidents.len(), 2);
        assert_eq!(output.incidents[0].details.category, None);
    }

    #[test]
    fn header_without_date_is_schema_error() {
        let result = clean_reader(
            "ID,Primary Type\n1,THEFT\n".as_bytes(),
            &PipelineConfig::default(),
            &NullProgress,
        );
        assert!(matches!(result, Err(CleanError::MissingColumn { .. })));
    }

    #[test]
    fn rerun_is_deterministic() {
        let a = run(SCENARIO);
        let b = run(SCENARIO);
        assert_eq!(a.incidents, b.incidents);
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = clean_file(
            Path::new("/nonexistent/crime_stats/raw.csv"),
            &PipelineConfig::default(),
            &NullProgress,
        );
        assert!(matches!(result, Err(CleanError::Io(_))));
    }
}
