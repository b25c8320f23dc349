#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation and query engine over cleaned incident records.
//!
//! Operations in [`query`] are pure functions of an [`IncidentView`] and
//! their parameters. [`tables`] builds the standard summary tables from
//! them and writes them as CSV.

pub mod query;
pub mod tables;
pub mod view;

pub use view::{IncidentView, OverflowView, Subset};

/// Errors that can occur while exporting summary tables.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
