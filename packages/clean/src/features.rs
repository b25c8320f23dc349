//! Calendar feature derivation.

use crime_stats_incident_models::{Incident, ValidatedIncident};

/// Enriches validated records with year, month, hour, and weekday derived
/// from `occurred_at`. Per-record and order-preserving.
#[must_use]
pub fn derive_features(records: Vec<ValidatedIncident>) -> Vec<Incident> {
    records.into_iter().map(Incident::from).collect()
}
