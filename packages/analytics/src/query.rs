//! Aggregation operations over incident views.
//!
//! Every operation reads its view and returns a fresh result. None of them
//! fail: degenerate inputs (an inverted year range, an empty view, a group
//! without known flags) produce empty or `None` results.

use std::collections::{BTreeMap, BTreeSet};

use crime_stats_analytics_models::{
    Centroid, CountRow, CrossTab, DEFAULT_OVERFLOW_LABEL, GeoBin, GeoBinSummary, GroupedCounts,
    OverviewStats, RankedValue, RateByGroup,
};
use crime_stats_incident_models::{FlagField, GroupKey, GroupValue};

use crate::view::{IncidentView, OverflowView, Subset};

/// Records whose year lies in `[low, high]`. Empty when `low > high`.
#[must_use]
pub fn filter_by_year_range<V: IncidentView + ?Sized>(view: &V, low: i32, high: i32) -> Subset<'_> {
    if low > high {
        log::debug!("Inverted year range {low}..={high}; returning empty subset");
        return Subset::default();
    }
    view.incidents()
        .filter(|i| (low..=high).contains(&i.time.year()))
        .collect()
}

/// Records whose `key` value, as seen through `view`, equals `value`.
#[must_use]
pub fn filter_equals<'v, V: IncidentView + ?Sized>(
    view: &'v V,
    key: GroupKey,
    value: &GroupValue,
) -> Subset<'v> {
    view.incidents()
        .filter(|i| view.value_of(i, key) == *value)
        .collect()
}

/// Counts records per distinct tuple of `keys` values.
///
/// Only observed tuples appear; see [`densify`] for filling a fixed domain.
#[must_use]
pub fn grouped_count<V: IncidentView + ?Sized>(view: &V, keys: &[GroupKey]) -> GroupedCounts {
    let mut counts = GroupedCounts::new(keys.to_vec());
    for incident in view.incidents() {
        counts.increment(keys.iter().map(|&k| view.value_of(incident, k)).collect());
    }
    counts
}

/// Every distinct value of `key` with its count, most frequent first.
/// Equal counts are ordered by value.
#[must_use]
pub fn value_counts<V: IncidentView + ?Sized>(view: &V, key: GroupKey) -> Vec<RankedValue> {
    let mut counts: BTreeMap<GroupValue, u64> = BTreeMap::new();
    for incident in view.incidents() {
        *counts.entry(view.value_of(incident, key)).or_insert(0) += 1;
    }

    let mut ranked: Vec<RankedValue> = counts
        .into_iter()
        .map(|(value, count)| RankedValue { value, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    ranked
}

/// The `n` most frequent values of `key`.
#[must_use]
pub fn top_n<V: IncidentView + ?Sized>(view: &V, key: GroupKey, n: usize) -> Vec<RankedValue> {
    let mut ranked = value_counts(view, key);
    ranked.truncate(n);
    ranked
}

fn top_values<V: IncidentView + ?Sized>(view: &V, key: GroupKey, n: usize) -> BTreeSet<GroupValue> {
    top_n(view, key, n).into_iter().map(|r| r.value).collect()
}

/// Relabels every value of `key` outside the top `n` to `"OTHERS"`.
#[must_use]
pub fn top_n_with_overflow<V: IncidentView + ?Sized>(
    view: &V,
    key: GroupKey,
    n: usize,
) -> OverflowView<'_, V> {
    top_n_with_overflow_label(view, key, n, DEFAULT_OVERFLOW_LABEL)
}

/// Relabels every value of `key` outside the top `n` to `label`.
///
/// If `label` is itself one of the kept values, underscores are appended
/// until it is distinct, so the kept values and the overflow bucket never
/// share a group.
#[must_use]
pub fn top_n_with_overflow_label<'v, V: IncidentView + ?Sized>(
    view: &'v V,
    key: GroupKey,
    n: usize,
    label: &str,
) -> OverflowView<'v, V> {
    let kept = top_values(view, key, n);
    let mut overflow = label.to_string();
    while kept.contains(&GroupValue::Text(overflow.clone())) {
        overflow.push('_');
    }
    if overflow != label {
        log::warn!("Overflow label {label:?} is a top-{n} value of {key}; using {overflow:?}");
    }
    OverflowView::new(view, key, kept, overflow)
}

/// Records whose `key` value is among the top `k`.
#[must_use]
pub fn restrict_to_top<V: IncidentView + ?Sized>(view: &V, key: GroupKey, k: usize) -> Subset<'_> {
    let kept = top_values(view, key, k);
    view.incidents()
        .filter(|i| kept.contains(&view.value_of(i, key)))
        .collect()
}

/// Fraction of records with `flag` set, per value of `key`.
///
/// Records with an unknown flag count toward the group size but not the
/// rate. A group with no known flags has no rate.
#[must_use]
pub fn rate_by_group<V: IncidentView + ?Sized>(
    view: &V,
    flag: FlagField,
    key: GroupKey,
) -> RateByGroup {
    let mut tallies: BTreeMap<GroupValue, (u64, u64, u64)> = BTreeMap::new();
    for incident in view.incidents() {
        let (records, known, flagged) = tallies.entry(view.value_of(incident, key)).or_default();
        *records += 1;
        if let Some(set) = flag.value_of(incident) {
            *known += 1;
            if set {
                *flagged += 1;
            }
        }
    }
    RateByGroup::from_tallies(flag, key, tallies)
}

/// Dense count matrix of `row_key` against `column_key` over observed
/// values.
#[must_use]
pub fn cross_tab<V: IncidentView + ?Sized>(
    view: &V,
    row_key: GroupKey,
    column_key: GroupKey,
) -> CrossTab {
    cross_tab_with_domains(view, row_key, column_key, None, None)
}

/// Dense count matrix whose axes are the observed values plus any values in
/// the given domains.
#[must_use]
pub fn cross_tab_with_domains<V: IncidentView + ?Sized>(
    view: &V,
    row_key: GroupKey,
    column_key: GroupKey,
    row_domain: Option<&[GroupValue]>,
    column_domain: Option<&[GroupValue]>,
) -> CrossTab {
    let pairs: Vec<(GroupValue, GroupValue)> = view
        .incidents()
        .map(|i| (view.value_of(i, row_key), view.value_of(i, column_key)))
        .collect();

    let mut rows: BTreeSet<GroupValue> = row_domain.unwrap_or_default().iter().cloned().collect();
    let mut columns: BTreeSet<GroupValue> =
        column_domain.unwrap_or_default().iter().cloned().collect();
    for (row, column) in &pairs {
        rows.insert(row.clone());
        columns.insert(column.clone());
    }

    let mut tab = CrossTab::zeroed(
        row_key,
        column_key,
        rows.into_iter().collect(),
        columns.into_iter().collect(),
    );
    for (row, column) in &pairs {
        tab.increment(row, column);
    }
    tab
}

/// Record count and mean location per value of `key`.
#[must_use]
pub fn geo_bin_summary<V: IncidentView + ?Sized>(view: &V, key: GroupKey) -> GeoBinSummary {
    #[derive(Default)]
    struct Acc {
        count: u64,
        located: u64,
        lat_sum: f64,
        lon_sum: f64,
    }

    let mut accs: BTreeMap<GroupValue, Acc> = BTreeMap::new();
    for incident in view.incidents() {
        let acc = accs.entry(view.value_of(incident, key)).or_default();
        acc.count += 1;
        if let Some((lat, lon)) = incident.details.coordinates() {
            acc.located += 1;
            acc.lat_sum += lat;
            acc.lon_sum += lon;
        }
    }

    let bins = accs
        .into_iter()
        .map(|(value, acc)| {
            #[allow(clippy::cast_precision_loss)]
            let centroid = (acc.located > 0).then(|| Centroid {
                latitude: acc.lat_sum / acc.located as f64,
                longitude: acc.lon_sum / acc.located as f64,
            });
            let bin = GeoBin {
                value: value.clone(),
                count: acc.count,
                located: acc.located,
                centroid,
            };
            (value, bin)
        })
        .collect();

    GeoBinSummary::new(key, bins)
}

/// Total records, arrest rate, and share of `violent_types` categories.
#[must_use]
pub fn overview<V: IncidentView + ?Sized>(view: &V, violent_types: &[&str]) -> OverviewStats {
    let mut total = 0u64;
    let mut known_arrest = 0u64;
    let mut arrests = 0u64;
    let mut violent = 0u64;

    for incident in view.incidents() {
        total += 1;
        if let Some(arrested) = incident.details.arrested {
            known_arrest += 1;
            arrests += u64::from(arrested);
        }
        if incident
            .details
            .category
            .as_deref()
            .is_some_and(|c| violent_types.contains(&c))
        {
            violent += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let pct = |part: u64, whole: u64| (whole > 0).then(|| 100.0 * part as f64 / whole as f64);

    OverviewStats {
        total,
        arrest_rate_pct: pct(arrests, known_arrest),
        violent_share_pct: pct(violent, total),
    }
}

/// Left-joins single-key `counts` onto `domain`, filling missing values with
/// zero. Observed values outside the domain are dropped.
#[must_use]
pub fn densify(counts: &GroupedCounts, domain: &[GroupValue]) -> Vec<CountRow> {
    domain
        .iter()
        .map(|value| CountRow {
            key: vec![value.clone()],
            count: counts.get_one(value).unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use crime_stats_analytics_models::VIOLENT_TYPES;
    use crime_stats_incident_models::{Incident, IncidentDetails, Weekday};

    use super::*;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn incident(id: u32, occurred_at: NaiveDateTime, category: Option<&str>) -> Incident {
        Incident::new(
            id.to_string(),
            occurred_at,
            IncidentDetails {
                category: category.map(ToString::to_string),
                ..IncidentDetails::default()
            },
        )
    }

    fn with(mut incident: Incident, f: impl FnOnce(&mut IncidentDetails)) -> Incident {
        f(&mut incident.details);
        incident
    }

    fn sample() -> Vec<Incident> {
        vec![
            with(incident(1, at(2020, 1, 6, 9), Some("THEFT")), |d| {
                d.arrested = Some(true);
                d.district = Some(1);
                d.latitude = Some(41.8);
                d.longitude = Some(-87.6);
            }),
            with(incident(2, at(2020, 2, 7, 9), Some("THEFT")), |d| {
                d.arrested = Some(false);
                d.district = Some(1);
                d.latitude = Some(41.9);
                d.longitude = Some(-87.7);
            }),
            with(incident(3, at(2020, 3, 8, 22), Some("BATTERY")), |d| {
                d.arrested = Some(true);
                d.district = Some(2);
            }),
            with(incident(4, at(2022, 4, 9, 22), Some("ASSAULT")), |d| {
                d.arrested = None;
                d.district = Some(2);
            }),
            incident(5, at(2022, 5, 10, 3), Some("THEFT")),
            incident(6, at(2023, 6, 11, 3), None),
        ]
    }

    #[test]
    fn year_range_is_inclusive() {
        let records = sample();
        let subset = filter_by_year_range(records.as_slice(), 2020, 2022);
        assert_eq!(subset.len(), 5);
        assert!(
            subset
                .incidents()
                .all(|i| (2020..=2022).contains(&i.time.year()))
        );
    }

    #[test]
    fn inverted_year_range_is_empty() {
        let records = sample();
        assert!(filter_by_year_range(records.as_slice(), 2023, 2020).is_empty());
    }

    #[test]
    fn grouped_count_omits_absent_years() {
        let records = sample();
        let subset = filter_by_year_range(records.as_slice(), 2020, 2022);
        let counts = grouped_count(&subset, &[GroupKey::Year]);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get_one(&GroupValue::Int(2020)), Some(3));
        assert_eq!(counts.get_one(&GroupValue::Int(2021)), None);
        assert_eq!(counts.get_one(&GroupValue::Int(2022)), Some(2));
    }

    #[test]
    fn grouped_count_supports_key_tuples_and_nulls() {
        let records = sample();
        let counts = grouped_count(records.as_slice(), &[GroupKey::Year, GroupKey::Category]);
        assert_eq!(
            counts.get(&[GroupValue::Int(2020), "THEFT".into()]),
            Some(2)
        );
        assert_eq!(
            counts.get(&[GroupValue::Int(2023), GroupValue::Null]),
            Some(1)
        );
        assert_eq!(counts.total(), 6);
    }

    #[test]
    fn top_n_breaks_ties_by_value() {
        let records = sample();
        let ranked = top_n(records.as_slice(), GroupKey::Category, 3);
        let values: Vec<GroupValue> = ranked.iter().map(|r| r.value.clone()).collect();
        assert_eq!(
            values,
            vec!["THEFT".into(), "ASSAULT".into(), "BATTERY".into()]
        );
        assert_eq!(ranked[0].count, 3);
    }

    #[test]
    fn overflow_partitions_records() {
        let records = sample();
        for n in 0..5 {
            let view = top_n_with_overflow(records.as_slice(), GroupKey::Category, n);
            let counts = grouped_count(&view, &[GroupKey::Category]);
            assert_eq!(counts.total(), records.len() as u64);

            let named: u64 = view
                .kept()
                .iter()
                .map(|v| counts.get_one(v).unwrap_or(0))
                .sum();
            let others = counts.get_one(&view.overflow_value()).unwrap_or(0);
            assert_eq!(named + others, records.len() as u64);
        }
    }

    #[test]
    fn overflow_label_never_collides_with_kept_value() {
        let records = vec![
            incident(1, at(2020, 1, 1, 0), Some("OTHERS")),
            incident(2, at(2020, 1, 2, 0), Some("OTHERS")),
            incident(3, at(2020, 1, 3, 0), Some("THEFT")),
            incident(4, at(2020, 1, 4, 0), Some("ARSON")),
        ];
        let view = top_n_with_overflow(records.as_slice(), GroupKey::Category, 1);
        assert_eq!(view.overflow_value(), GroupValue::from("OTHERS_"));
        assert!(!view.kept().contains(&view.overflow_value()));

        let counts = grouped_count(&view, &[GroupKey::Category]);
        assert_eq!(counts.get_one(&"OTHERS".into()), Some(2));
        assert_eq!(counts.get_one(&"OTHERS_".into()), Some(2));

        let named: u64 = view
            .kept()
            .iter()
            .map(|v| counts.get_one(v).unwrap_or(0))
            .sum();
        let others = counts.get_one(&view.overflow_value()).unwrap_or(0);
        assert_eq!(named + others, records.len() as u64);
    }

    #[test]
    fn overflow_does_not_affect_base_view() {
        let records = sample();
        let _view = top_n_with_overflow(records.as_slice(), GroupKey::Category, 1);
        let counts = grouped_count(records.as_slice(), &[GroupKey::Category]);
        assert_eq!(counts.get_one(&"BATTERY".into()), Some(1));
        assert_eq!(counts.get_one(&"OTHERS".into()), None);
    }

    #[test]
    fn restrict_to_top_keeps_leading_values() {
        let records = sample();
        let subset = restrict_to_top(records.as_slice(), GroupKey::Category, 1);
        assert_eq!(subset.len(), 3);
        assert!(
            subset
                .incidents()
                .all(|i| i.details.category.as_deref() == Some("THEFT"))
        );
    }

    #[test]
    fn rate_by_group_ignores_unknown_flags() {
        let records = sample();
        let rates = rate_by_group(records.as_slice(), FlagField::Arrested, GroupKey::Category);

        assert_eq!(rates.get(&"THEFT".into()), Some(0.5));
        assert_eq!(rates.get(&"BATTERY".into()), Some(1.0));
        assert_eq!(rates.get(&"ASSAULT".into()), None);
        assert_eq!(rates.group(&"THEFT".into()).unwrap().records, 3);
    }

    #[test]
    fn rate_on_empty_view_is_none() {
        let records: Vec<Incident> = Vec::new();
        let rates = rate_by_group(records.as_slice(), FlagField::Domestic, GroupKey::District);
        assert!(rates.is_empty());
        assert_eq!(rates.get(&GroupValue::Int(1)), None);
    }

    #[test]
    fn cross_tab_is_dense_and_sums_to_count() {
        let records = sample();
        let tab = cross_tab(records.as_slice(), GroupKey::Hour, GroupKey::Category);

        assert_eq!(tab.rows.len(), 3);
        assert_eq!(tab.columns.len(), 4);
        assert!(tab.cells.iter().all(|row| row.len() == tab.columns.len()));
        assert_eq!(tab.total(), records.len() as u64);
        assert_eq!(tab.get(&GroupValue::Int(9), &"THEFT".into()), 2);
        assert_eq!(tab.get(&GroupValue::Int(3), &"BATTERY".into()), 0);
    }

    #[test]
    fn cross_tab_includes_domains() {
        let records = sample();
        let weekdays = GroupKey::Weekday.domain().unwrap();
        let hours = GroupKey::Hour.domain().unwrap();
        let tab = cross_tab_with_domains(
            records.as_slice(),
            GroupKey::Weekday,
            GroupKey::Hour,
            Some(weekdays.as_slice()),
            Some(hours.as_slice()),
        );

        assert_eq!(tab.rows.len(), 7);
        assert_eq!(tab.columns.len(), 24);
        assert_eq!(tab.rows[0], GroupValue::Weekday(Weekday::Monday));
        assert_eq!(tab.total(), records.len() as u64);
    }

    #[test]
    fn cross_tab_over_overflow_view() {
        let records = sample();
        let view = top_n_with_overflow(records.as_slice(), GroupKey::Category, 1);
        let tab = cross_tab(&view, GroupKey::Category, GroupKey::Year);
        assert_eq!(tab.rows, vec!["OTHERS".into(), "THEFT".into()]);
        assert_eq!(tab.total(), records.len() as u64);
    }

    #[test]
    fn geo_bins_use_located_records_only() {
        let records = sample();
        let summary = geo_bin_summary(records.as_slice(), GroupKey::District);

        let one = summary.get(&GroupValue::Int(1)).unwrap();
        assert_eq!(one.count, 2);
        let centroid = one.centroid.unwrap();
        assert!((centroid.latitude - 41.85).abs() < 1e-9);
        assert!((centroid.longitude + 87.65).abs() < 1e-9);

        let two = summary.get(&GroupValue::Int(2)).unwrap();
        assert_eq!(two.count, 2);
        assert_eq!(two.located, 0);
        assert_eq!(two.centroid, None);

        assert_eq!(summary.get(&GroupValue::Null).unwrap().count, 2);
    }

    #[test]
    fn overview_reports_percentages() {
        let records = sample();
        let stats = overview(records.as_slice(), &VIOLENT_TYPES);
        assert_eq!(stats.total, 6);
        // 2 arrests out of 3 known flags.
        assert!((stats.arrest_rate_pct.unwrap() - 200.0 / 3.0).abs() < 1e-9);
        // BATTERY and ASSAULT.
        assert!((stats.violent_share_pct.unwrap() - 100.0 / 3.0).abs() < 1e-9);

        let empty: Vec<Incident> = Vec::new();
        let stats = overview(empty.as_slice(), &VIOLENT_TYPES);
        assert_eq!(stats.arrest_rate_pct, None);
        assert_eq!(stats.violent_share_pct, None);
    }

    #[test]
    fn densify_fills_domain_with_zero() {
        let records = sample();
        let counts = grouped_count(records.as_slice(), &[GroupKey::Hour]);
        let dense = densify(&counts, &GroupKey::Hour.domain().unwrap());

        assert_eq!(dense.len(), 24);
        assert_eq!(dense[0].count, 0);
        assert_eq!(dense[9].count, 2);
        assert_eq!(dense.iter().map(|r| r.count).sum::<u64>(), 6);
    }

    #[test]
    fn filter_equals_selects_category() {
        let records = sample();
        let theft = filter_equals(records.as_slice(), GroupKey::Category, &"THEFT".into());
        assert_eq!(theft.len(), 3);

        let unknown = filter_equals(records.as_slice(), GroupKey::Category, &GroupValue::Null);
        assert_eq!(unknown.len(), 1);
    }

    #[test]
    fn operations_are_repeatable() {
        let records = sample();
        let a = cross_tab(records.as_slice(), GroupKey::Month, GroupKey::District);
        let b = cross_tab(records.as_slice(), GroupKey::Month, GroupKey::District);
        assert_eq!(a, b);
    }
}
