//! Validation and deduplication.
//!
//! The only stage that permanently discards rows. Each sub-step logs and
//! counts what it dropped so that nothing disappears silently; no single
//! bad row ever aborts the batch.

use std::collections::BTreeSet;

use crime_stats_incident_models::{GeoBounds, NormalizedIncident, ValidatedIncident};
use serde::Serialize;

/// Row counts observed by [`validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Records handed to the validator.
    pub input_rows: usize,
    /// Dropped because `occurred_at` was missing or unparseable.
    pub bad_dates: usize,
    /// Dropped because `id` was missing.
    pub missing_ids: usize,
    /// Dropped as later occurrences of an already-seen `id`.
    pub duplicates: usize,
    /// Dropped because both coordinates were present but outside the box.
    pub implausible_coordinates: usize,
    /// Records that survived every step.
    pub output_rows: usize,
}

impl ValidationReport {
    /// Total number of rows dropped across all sub-steps.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.bad_dates + self.missing_ids + self.duplicates + self.implausible_coordinates
    }
}

/// Filters `records` down to those satisfying the dataset invariants.
///
/// Steps, in order: drop null timestamps, drop null ids, keep the first
/// record seen for each id, then drop records whose coordinates are both
/// present and outside `bounds`. A record missing one or both coordinates
/// is always kept. Input order is preserved.
#[must_use]
pub fn validate(
    records: Vec<NormalizedIncident>,
    bounds: &GeoBounds,
) -> (Vec<ValidatedIncident>, ValidationReport) {
    let mut report = ValidationReport {
        input_rows: records.len(),
        ..ValidationReport::default()
    };

    let dated: Vec<_> = records
        .into_iter()
        .filter_map(|r| match r.occurred_at {
            Some(occurred_at) => Some((r.id, occurred_at, r.details)),
            None => {
                log::debug!("Dropping record {:?}: unparseable date", r.id);
                None
            }
        })
        .collect();
    report.bad_dates = report.input_rows - dated.len();
    log::info!(
        "Dropped {} rows with unparseable dates: {} -> {}",
        report.bad_dates,
        report.input_rows,
        dated.len()
    );

    let before = dated.len();
    let identified: Vec<ValidatedIncident> = dated
        .into_iter()
        .filter_map(|(id, occurred_at, details)| {
            id.map(|id| ValidatedIncident {
                id,
                occurred_at,
                details,
            })
        })
        .collect();
    report.missing_ids = before - identified.len();
    if report.missing_ids > 0 {
        log::info!("Dropped {} rows without an ID", report.missing_ids);
    }

    let before = identified.len();
    let deduped = dedup_by_id(identified);
    report.duplicates = before - deduped.len();
    log::info!(
        "Dedup by ID: {before} -> {} ({} duplicates removed)",
        deduped.len(),
        report.duplicates
    );

    let before = deduped.len();
    let plausible: Vec<ValidatedIncident> = deduped
        .into_iter()
        .filter(|r| match r.details.coordinates() {
            Some((lat, lon)) if !bounds.contains(lat, lon) => {
                log::debug!("Dropping record {}: implausible location ({lat}, {lon})", r.id);
                false
            }
            _ => true,
        })
        .collect();
    report.implausible_coordinates = before - plausible.len();
    log::info!(
        "Geo filter: {before} -> {} ({} outside plausibility box)",
        plausible.len(),
        report.implausible_coordinates
    );

    report.output_rows = plausible.len();
    (plausible, report)
}

/// Keeps the first record for each id.
fn dedup_by_id(records: Vec<ValidatedIncident>) -> Vec<ValidatedIncident> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}
