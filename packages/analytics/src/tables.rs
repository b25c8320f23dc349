//! Summary tables written as CSV files.
//!
//! Each table is a header row plus string cells, built from the query
//! operations over one view. Figures and maps are not rendered here; the
//! tables carry the numbers behind them.

use std::path::{Path, PathBuf};

use crime_stats_analytics_models::{CountRow, CrossTab, RateByGroup};
use crime_stats_incident_models::{FlagField, GroupKey};

use crate::AnalyticsError;
use crate::query::{
    cross_tab_with_domains, densify, geo_bin_summary, grouped_count, rate_by_group,
    restrict_to_top, top_n,
};
use crate::view::IncidentView;

/// Rows listed in each ranked table.
pub const TOP_LIMIT: usize = 15;

/// Offense types shown in the hour-by-type cross-tab.
pub const HOUR_BY_TYPE_TOP: usize = 8;

/// Offense types shown in the type-by-district cross-tab.
pub const TYPE_BY_DISTRICT_TOP: usize = 5;

/// A named table ready to be written as CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryTable {
    /// File stem, e.g. `year_counts`.
    pub name: &'static str,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Column heading used for a grouping key.
#[must_use]
pub const fn column_label(key: GroupKey) -> &'static str {
    match key {
        GroupKey::Year => "Year",
        GroupKey::Month => "Month",
        GroupKey::Hour => "Hour",
        GroupKey::Weekday => "Weekday",
        GroupKey::Category => "Primary Type",
        GroupKey::Description => "Description",
        GroupKey::LocationDescription => "Location Description",
        GroupKey::District => "District",
        GroupKey::Ward => "Ward",
        GroupKey::CommunityArea => "Community Area",
        GroupKey::Beat => "Beat",
        GroupKey::Arrested => "Arrest",
        GroupKey::Domestic => "Domestic",
    }
}

fn count_table(name: &'static str, key: GroupKey, rows: &[CountRow]) -> SummaryTable {
    SummaryTable {
        name,
        header: vec![column_label(key).to_string(), "count".to_string()],
        rows: rows
            .iter()
            .map(|row| {
                let label = row.key.first().map(ToString::to_string).unwrap_or_default();
                vec![label, row.count.to_string()]
            })
            .collect(),
    }
}

fn observed_counts<V: IncidentView + ?Sized>(
    view: &V,
    name: &'static str,
    key: GroupKey,
) -> SummaryTable {
    count_table(name, key, &grouped_count(view, &[key]).rows())
}

fn dense_counts<V: IncidentView + ?Sized>(
    view: &V,
    name: &'static str,
    key: GroupKey,
) -> SummaryTable {
    let counts = grouped_count(view, &[key]);
    match key.domain() {
        Some(domain) => count_table(name, key, &densify(&counts, &domain)),
        None => count_table(name, key, &counts.rows()),
    }
}

fn top_counts<V: IncidentView + ?Sized>(
    view: &V,
    name: &'static str,
    key: GroupKey,
) -> SummaryTable {
    let rows: Vec<CountRow> = top_n(view, key, TOP_LIMIT)
        .into_iter()
        .map(|r| CountRow {
            key: vec![r.value],
            count: r.count,
        })
        .collect();
    count_table(name, key, &rows)
}

fn crosstab_table(name: &'static str, tab: &CrossTab) -> SummaryTable {
    let mut header = vec![column_label(tab.row_key).to_string()];
    header.extend(tab.columns.iter().map(ToString::to_string));

    let rows = tab
        .rows
        .iter()
        .zip(&tab.cells)
        .map(|(value, cells)| {
            let mut row = vec![value.to_string()];
            row.extend(cells.iter().map(ToString::to_string));
            row
        })
        .collect();

    SummaryTable { name, header, rows }
}

fn rate_column(flag: FlagField) -> &'static str {
    match flag {
        FlagField::Arrested => "arrest_rate",
        FlagField::Domestic => "domestic_rate",
    }
}

fn ranked_rate_table(name: &'static str, rates: &RateByGroup) -> SummaryTable {
    SummaryTable {
        name,
        header: vec![
            column_label(rates.key).to_string(),
            rate_column(rates.flag).to_string(),
        ],
        rows: rates
            .ranked()
            .into_iter()
            .take(TOP_LIMIT)
            .filter_map(|g| g.rate.map(|rate| vec![g.value.to_string(), rate.to_string()]))
            .collect(),
    }
}

fn rate_table(name: &'static str, rates: &RateByGroup) -> SummaryTable {
    SummaryTable {
        name,
        header: vec![
            column_label(rates.key).to_string(),
            rate_column(rates.flag).to_string(),
            "count".to_string(),
        ],
        rows: rates
            .iter()
            .filter_map(|g| {
                g.rate
                    .map(|rate| vec![g.value.to_string(), rate.to_string(), g.records.to_string()])
            })
            .collect(),
    }
}

fn district_summary<V: IncidentView + ?Sized>(view: &V) -> SummaryTable {
    let summary = geo_bin_summary(view, GroupKey::District);
    SummaryTable {
        name: "district_summary",
        header: ["District", "count", "latitude", "longitude"]
            .map(String::from)
            .to_vec(),
        rows: summary
            .iter()
            .map(|bin| {
                let (lat, lon) = bin.centroid.map_or_else(
                    || (String::new(), String::new()),
                    |c| (c.latitude.to_string(), c.longitude.to_string()),
                );
                vec![bin.value.to_string(), bin.count.to_string(), lat, lon]
            })
            .collect(),
    }
}

/// Builds every summary table over `view`.
#[must_use]
pub fn build_tables<V: IncidentView + ?Sized>(view: &V) -> Vec<SummaryTable> {
    let weekdays = GroupKey::Weekday.domain();
    let hours = GroupKey::Hour.domain();
    let heatmap = cross_tab_with_domains(
        view,
        GroupKey::Weekday,
        GroupKey::Hour,
        weekdays.as_deref(),
        hours.as_deref(),
    );

    let top_types = restrict_to_top(view, GroupKey::Category, HOUR_BY_TYPE_TOP);
    let hour_by_type = cross_tab_with_domains(
        &top_types,
        GroupKey::Hour,
        GroupKey::Category,
        hours.as_deref(),
        None,
    );

    let top_types = restrict_to_top(view, GroupKey::Category, TYPE_BY_DISTRICT_TOP);
    let type_by_district =
        cross_tab_with_domains(&top_types, GroupKey::Category, GroupKey::District, None, None);

    vec![
        observed_counts(view, "year_counts", GroupKey::Year),
        dense_counts(view, "month_counts", GroupKey::Month),
        dense_counts(view, "hour_counts", GroupKey::Hour),
        dense_counts(view, "weekday_counts", GroupKey::Weekday),
        crosstab_table("heatmap_weekday_hour_counts", &heatmap),
        top_counts(view, "top15_district_counts", GroupKey::District),
        top_counts(view, "top15_community_area_counts", GroupKey::CommunityArea),
        top_counts(view, "top15_primary_type_counts", GroupKey::Category),
        crosstab_table("crosstab_hour_by_type_top8", &hour_by_type),
        crosstab_table("crosstab_type_by_district_top5", &type_by_district),
        ranked_rate_table(
            "top15_arrest_rate_by_type",
            &rate_by_group(view, FlagField::Arrested, GroupKey::Category),
        ),
        ranked_rate_table(
            "top15_domestic_rate_by_type",
            &rate_by_group(view, FlagField::Domestic, GroupKey::Category),
        ),
        rate_table(
            "district_arrest_rate",
            &rate_by_group(view, FlagField::Arrested, GroupKey::District),
        ),
        district_summary(view),
    ]
}

/// Writes each table to `{dir}/{name}.csv`, creating `dir` if needed.
///
/// Returns the written paths in table order.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the directory or a file cannot be written.
pub fn write_tables(dir: &Path, tables: &[SummaryTable]) -> Result<Vec<PathBuf>, AnalyticsError> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        let path = dir.join(format!("{}.csv", table.name));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&table.header)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        log::info!("Wrote {} ({} rows)", path.display(), table.rows.len());
        written.push(path);
    }

    Ok(written)
}

/// Looks up a table by name.
#[must_use]
pub fn find<'t>(tables: &'t [SummaryTable], name: &str) -> Option<&'t SummaryTable> {
    tables.iter().find(|t| t.name == name)
}
