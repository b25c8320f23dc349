#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types returned by the incident query engine.
//!
//! Every result is an owned snapshot: it holds no reference to the records
//! it was computed from. Results serialize to JSON as ordered row lists,
//! since group values are not always valid JSON object keys.

use std::collections::BTreeMap;

use crime_stats_incident_models::{FlagField, GroupKey, GroupValue};
use serde::{Serialize, Serializer};

/// Label given to values outside a top-N selection.
pub const DEFAULT_OVERFLOW_LABEL: &str = "OTHERS";

/// Offense categories counted as violent in the overview statistics.
pub const VIOLENT_TYPES: [&str; 5] = [
    "HOMICIDE",
    "ROBBERY",
    "BATTERY",
    "CRIM SEXUAL ASSAULT",
    "ASSAULT",
];

/// One row of a grouped count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountRow {
    /// One value per grouping key, in key order.
    pub key: Vec<GroupValue>,
    pub count: u64,
}

/// Record counts per distinct combination of grouping-key values.
///
/// Only combinations present in the input appear. Iteration is ordered by
/// key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedCounts {
    keys: Vec<GroupKey>,
    #[serde(rename = "rows", serialize_with = "serialize_count_rows")]
    counts: BTreeMap<Vec<GroupValue>, u64>,
}

impl GroupedCounts {
    /// Creates an empty result for `keys`.
    #[must_use]
    pub fn new(keys: Vec<GroupKey>) -> Self {
        Self {
            keys,
            counts: BTreeMap::new(),
        }
    }

    /// Adds one record with the given key tuple.
    pub fn increment(&mut self, key: Vec<GroupValue>) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// The grouping keys, in tuple order.
    #[must_use]
    pub fn keys(&self) -> &[GroupKey] {
        &self.keys
    }

    /// Count for a key tuple, or `None` if the tuple was never observed.
    #[must_use]
    pub fn get(&self, key: &[GroupValue]) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// Count for a single-key value. Shorthand for `get(&[value])`.
    #[must_use]
    pub fn get_one(&self, value: &GroupValue) -> Option<u64> {
        self.get(std::slice::from_ref(value))
    }

    /// Number of distinct key tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Iterates `(key tuple, count)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[GroupValue], u64)> {
        self.counts.iter().map(|(k, &c)| (k.as_slice(), c))
    }

    /// Owned rows in key order.
    #[must_use]
    pub fn rows(&self) -> Vec<CountRow> {
        self.iter()
            .map(|(key, count)| CountRow {
                key: key.to_vec(),
                count,
            })
            .collect()
    }
}

fn serialize_count_rows<S: Serializer>(
    counts: &BTreeMap<Vec<GroupValue>, u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(counts.iter().map(|(key, &count)| CountRow {
        key: key.clone(),
        count,
    }))
}

/// A value and its frequency, as returned by top-N ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedValue {
    pub value: GroupValue,
    pub count: u64,
}

/// Flag statistics for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRate {
    pub value: GroupValue,
    /// Records in the group.
    pub records: u64,
    /// Records whose flag is known.
    pub known: u64,
    /// Records whose flag is `true`.
    pub flagged: u64,
    /// `flagged / known`, or `None` when no flag in the group is known.
    pub rate: Option<f64>,
}

/// Fraction of records with a flag set, per group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateByGroup {
    pub flag: FlagField,
    pub key: GroupKey,
    #[serde(serialize_with = "serialize_map_values")]
    groups: BTreeMap<GroupValue, GroupRate>,
}

impl RateByGroup {
    /// Builds the result from per-group `(records, known, flagged)` tallies.
    #[must_use]
    pub fn from_tallies(
        flag: FlagField,
        key: GroupKey,
        tallies: BTreeMap<GroupValue, (u64, u64, u64)>,
    ) -> Self {
        let groups = tallies
            .into_iter()
            .map(|(value, (records, known, flagged))| {
                #[allow(clippy::cast_precision_loss)]
                let rate = (known > 0).then(|| flagged as f64 / known as f64);
                let stats = GroupRate {
                    value: value.clone(),
                    records,
                    known,
                    flagged,
                    rate,
                };
                (value, stats)
            })
            .collect();

        Self { flag, key, groups }
    }

    /// Rate for a group. `None` if the group is absent or has no known flags.
    #[must_use]
    pub fn get(&self, value: &GroupValue) -> Option<f64> {
        self.groups.get(value).and_then(|g| g.rate)
    }

    /// Full statistics for a group.
    #[must_use]
    pub fn group(&self, value: &GroupValue) -> Option<&GroupRate> {
        self.groups.get(value)
    }

    /// Groups in key order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupRate> {
        self.groups.values()
    }

    /// Groups with a defined rate, highest first. Ties keep key order.
    #[must_use]
    pub fn ranked(&self) -> Vec<&GroupRate> {
        let mut rows: Vec<&GroupRate> = self.iter().filter(|g| g.rate.is_some()).collect();
        rows.sort_by(|a, b| {
            b.rate
                .partial_cmp(&a.rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn serialize_map_values<S: Serializer, K, V: Serialize>(
    map: &BTreeMap<K, V>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(map.values())
}

/// Dense two-dimensional count matrix.
///
/// `cells[r][c]` is the number of records whose row-key value is
/// `rows[r]` and whose column-key value is `columns[c]`. Every cell is
/// present; unobserved combinations are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTab {
    pub row_key: GroupKey,
    pub column_key: GroupKey,
    pub rows: Vec<GroupValue>,
    pub columns: Vec<GroupValue>,
    pub cells: Vec<Vec<u64>>,
}

impl CrossTab {
    /// Creates an all-zero matrix. Both axes must be sorted and distinct.
    #[must_use]
    pub fn zeroed(
        row_key: GroupKey,
        column_key: GroupKey,
        rows: Vec<GroupValue>,
        columns: Vec<GroupValue>,
    ) -> Self {
        let cells = vec![vec![0; columns.len()]; rows.len()];
        Self {
            row_key,
            column_key,
            rows,
            columns,
            cells,
        }
    }

    /// Adds one observation. Returns `false` if either value is not on its
    /// axis.
    pub fn increment(&mut self, row: &GroupValue, column: &GroupValue) -> bool {
        match (self.rows.binary_search(row), self.columns.binary_search(column)) {
            (Ok(r), Ok(c)) => {
                self.cells[r][c] += 1;
                true
            }
            _ => false,
        }
    }

    /// Cell count. Zero for values not on the axes.
    #[must_use]
    pub fn get(&self, row: &GroupValue, column: &GroupValue) -> u64 {
        match (self.rows.binary_search(row), self.columns.binary_search(column)) {
            (Ok(r), Ok(c)) => self.cells[r][c],
            _ => 0,
        }
    }

    /// Sum of each row.
    #[must_use]
    pub fn row_totals(&self) -> Vec<u64> {
        self.cells.iter().map(|row| row.iter().sum()).collect()
    }

    /// Sum of every cell.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.row_totals().iter().sum()
    }
}

/// Mean location of a set of records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub latitude: f64,
    pub longitude: f64,
}

/// Count and centroid for one spatial group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoBin {
    pub value: GroupValue,
    /// Records in the group.
    pub count: u64,
    /// Records with both coordinates present.
    pub located: u64,
    /// `None` when no record in the group has coordinates.
    pub centroid: Option<Centroid>,
}

/// Per-group spatial summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoBinSummary {
    pub key: GroupKey,
    #[serde(serialize_with = "serialize_map_values")]
    bins: BTreeMap<GroupValue, GeoBin>,
}

impl GeoBinSummary {
    #[must_use]
    pub const fn new(key: GroupKey, bins: BTreeMap<GroupValue, GeoBin>) -> Self {
        Self { key, bins }
    }

    #[must_use]
    pub fn get(&self, value: &GroupValue) -> Option<&GeoBin> {
        self.bins.get(value)
    }

    /// Bins in key order.
    pub fn iter(&self) -> impl Iterator<Item = &GeoBin> {
        self.bins.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Headline figures for a record set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total: u64,
    /// Percentage of records with a known arrest flag that were arrests.
    pub arrest_rate_pct: Option<f64>,
    /// Percentage of records in a violent category.
    pub violent_share_pct: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_counts_are_key_ordered() {
        let mut counts = GroupedCounts::new(vec![GroupKey::Category]);
        counts.increment(vec!["THEFT".into()]);
        counts.increment(vec![GroupValue::Null]);
        counts.increment(vec!["BATTERY".into()]);
        counts.increment(vec!["THEFT".into()]);

        let rows = counts.rows();
        assert_eq!(rows[0].key, vec![GroupValue::from("BATTERY")]);
        assert_eq!(rows[1].count, 2);
        assert_eq!(rows[2].key, vec![GroupValue::Null]);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.get_one(&"ARSON".into()), None);
    }

    #[test]
    fn grouped_counts_serialize_as_rows() {
        let mut counts = GroupedCounts::new(vec![GroupKey::Year]);
        counts.increment(vec![GroupValue::Int(2020)]);
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "keys": ["year"], "rows": [{ "key": [2020], "count": 1 }] })
        );
    }

    #[test]
    fn rate_is_none_without_known_flags() {
        let mut tallies = BTreeMap::new();
        tallies.insert(GroupValue::from("THEFT"), (4, 4, 1));
        tallies.insert(GroupValue::from("ARSON"), (2, 0, 0));
        let rates = RateByGroup::from_tallies(FlagField::Arrested, GroupKey::Category, tallies);

        assert_eq!(rates.get(&"THEFT".into()), Some(0.25));
        assert_eq!(rates.get(&"ARSON".into()), None);
        assert_eq!(rates.get(&"NARCOTICS".into()), None);
        assert_eq!(rates.ranked().len(), 1);
    }

    #[test]
    fn crosstab_ignores_off_axis_values() {
        let mut tab = CrossTab::zeroed(
            GroupKey::Weekday,
            GroupKey::Hour,
            vec![GroupValue::Int(1), GroupValue::Int(2)],
            vec![GroupValue::Int(0)],
        );
        assert!(tab.increment(&GroupValue::Int(2), &GroupValue::Int(0)));
        assert!(!tab.increment(&GroupValue::Int(3), &GroupValue::Int(0)));
        assert_eq!(tab.get(&GroupValue::Int(2), &GroupValue::Int(0)), 1);
        assert_eq!(tab.get(&GroupValue::Int(1), &GroupValue::Int(0)), 0);
        assert_eq!(tab.total(), 1);
    }
}
