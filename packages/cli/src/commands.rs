//! Subcommand implementations shared by the flag-driven CLI and the
//! interactive menu.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Subcommand};
use crime_stats_analytics::query::{
    cross_tab_with_domains, densify, filter_by_year_range, filter_equals, geo_bin_summary,
    grouped_count, overview, rate_by_group, restrict_to_top, top_n, top_n_with_overflow,
};
use crime_stats_analytics::tables::{build_tables, write_tables};
use crime_stats_analytics::{IncidentView, Subset};
use crime_stats_analytics_models::VIOLENT_TYPES;
use crime_stats_clean::config::PipelineConfig;
use crime_stats_cli_utils::{IndicatifProgress, MultiProgress};
use crime_stats_database::{dataset, paths};
use crime_stats_incident_models::{FlagField, GroupKey, GroupValue, Incident};
use serde::Serialize;

/// Overrides for a cleaning run. Unset fields fall back to the config file
/// and then to the defaults under the data directory.
#[derive(Debug, Clone, Default)]
pub struct CleanArgs {
    pub config: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub parquet: Option<PathBuf>,
}

/// Record selection applied before a query.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// First year to include
    #[arg(long)]
    pub from: Option<i32>,
    /// Last year to include
    #[arg(long)]
    pub to: Option<i32>,
    /// Only this primary type (e.g. "THEFT")
    #[arg(long)]
    pub category: Option<String>,
    /// Only this police district
    #[arg(long)]
    pub district: Option<i64>,
}

/// Aggregations available from `crime_stats query`.
#[derive(Subcommand, Debug, Clone)]
pub enum QueryCommand {
    /// Record counts per group
    Counts {
        /// Comma-separated grouping keys (e.g. `year,category`)
        #[arg(long = "by", value_delimiter = ',', default_value = "year")]
        keys: Vec<GroupKey>,
        /// Fill the key's full domain with zeros (single month/hour/weekday key)
        #[arg(long)]
        dense: bool,
    },
    /// Most frequent values of a key
    Top {
        #[arg(default_value = "category")]
        key: GroupKey,
        #[arg(short, long, default_value_t = 10)]
        n: usize,
        /// Count everything outside the top N as "OTHERS"
        #[arg(long)]
        overflow: bool,
    },
    /// Fraction of records with a flag set, per group
    Rates {
        flag: FlagField,
        #[arg(default_value = "category")]
        key: GroupKey,
    },
    /// Dense count matrix of two keys
    Crosstab {
        row: GroupKey,
        column: GroupKey,
        /// Keep only the top N values of the column key
        #[arg(long)]
        top: Option<usize>,
        /// Include every value of fixed domains (month, hour, weekday)
        #[arg(long)]
        dense: bool,
    },
    /// Record count and centroid per spatial group
    Geo {
        #[arg(default_value = "district")]
        key: GroupKey,
    },
    /// Total records, arrest rate, and violent share
    Overview,
}

/// Runs the cleaning pipeline and writes the dataset.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded, the input cannot be
/// read, or the dataset cannot be written.
pub fn clean(args: &CleanArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let mut config = PipelineConfig::resolve(args.config.as_deref())?;
    if args.input.is_some() {
        config.input.clone_from(&args.input);
    }
    if args.output.is_some() {
        config.output.clone_from(&args.output);
    }
    if args.parquet.is_some() {
        config.parquet.clone_from(&args.parquet);
    }

    let input = config.input.clone().unwrap_or_else(paths::raw_csv_path);
    let output = config.output.clone().unwrap_or_else(paths::cleaned_dataset_path);

    let progress = IndicatifProgress::rows_spinner(multi, "Reading raw rows");
    let cleaned = crime_stats_clean::clean_file(&input, &config, progress.as_ref())?;
    let written = dataset::write_dataset(&output, &cleaned.incidents, config.parquet.as_deref())?;

    print_json(&cleaned.report)?;
    log::info!(
        "Cleaned dataset: {} rows in {:.1}s",
        written.row_count,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Prints the stored row count and date range.
///
/// # Errors
///
/// Returns an error if the dataset is missing or unreadable.
pub fn summary(dataset_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_dataset(dataset_path);
    let summary = dataset::read_summary(&path)?;
    print_json(&summary)
}

/// Runs one aggregation and prints the result as JSON.
///
/// # Errors
///
/// Returns an error if the dataset cannot be loaded.
pub fn query(
    dataset_path: Option<&Path>,
    selection: &Selection,
    command: &QueryCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = load(dataset_path)?;
    let result = with_selection(&records, selection, |view| run_query(view, command))?;
    print_json(&result)
}

/// Builds the summary tables and writes them as CSV.
///
/// # Errors
///
/// Returns an error if the dataset cannot be loaded or a table cannot be
/// written.
pub fn tables(
    dataset_path: Option<&Path>,
    out_dir: Option<&Path>,
    selection: &Selection,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = load(dataset_path)?;
    let out_dir = out_dir.map_or_else(paths::tables_dir, Path::to_path_buf);

    let tables = with_selection(&records, selection, |view| build_tables(view));
    let written = write_tables(&out_dir, &tables)?;
    log::info!("Wrote {} tables to {}", written.len(), out_dir.display());

    Ok(())
}

fn resolve_dataset(dataset_path: Option<&Path>) -> PathBuf {
    dataset_path.map_or_else(paths::cleaned_dataset_path, Path::to_path_buf)
}

fn load(dataset_path: Option<&Path>) -> Result<Vec<Incident>, crime_stats_database::DbError> {
    dataset::load_dataset(&resolve_dataset(dataset_path))
}

/// Applies `selection` to `records` and passes the resulting view to `f`.
fn with_selection<R>(
    records: &[Incident],
    selection: &Selection,
    f: impl FnOnce(&Subset<'_>) -> R,
) -> R {
    let years = filter_by_year_range(
        records,
        selection.from.unwrap_or(i32::MIN),
        selection.to.unwrap_or(i32::MAX),
    );

    let by_category = match &selection.category {
        Some(category) => filter_equals(&years, GroupKey::Category, &category.as_str().into()),
        None => years.clone(),
    };

    let scope = match selection.district {
        Some(district) => filter_equals(&by_category, GroupKey::District, &district.into()),
        None => by_category.clone(),
    };

    log::debug!("Selected {} of {} records", scope.len(), records.len());
    f(&scope)
}

fn domain_of(key: GroupKey, dense: bool) -> Option<Vec<GroupValue>> {
    if dense { key.domain() } else { None }
}

fn run_query(
    view: &Subset<'_>,
    command: &QueryCommand,
) -> Result<serde_json::Value, serde_json::Error> {
    match command {
        QueryCommand::Counts { keys, dense } => {
            let counts = grouped_count(view, keys);
            match (keys.as_slice(), *dense) {
                ([key], true) => match key.domain() {
                    Some(domain) => serde_json::to_value(densify(&counts, &domain)),
                    None => {
                        log::warn!("{key} has no fixed domain; returning observed values");
                        serde_json::to_value(counts)
                    }
                },
                _ => serde_json::to_value(counts),
            }
        }
        QueryCommand::Top { key, n, overflow } => {
            if *overflow {
                let relabeled = top_n_with_overflow(view, *key, *n);
                serde_json::to_value(grouped_count(&relabeled, &[*key]))
            } else {
                serde_json::to_value(top_n(view, *key, *n))
            }
        }
        QueryCommand::Rates { flag, key } => serde_json::to_value(rate_by_group(view, *flag, *key)),
        QueryCommand::Crosstab {
            row,
            column,
            top,
            dense,
        } => {
            let row_domain = domain_of(*row, *dense);
            let column_domain = domain_of(*column, *dense);
            let tab = match top {
                Some(k) => cross_tab_with_domains(
                    &restrict_to_top(view, *column, *k),
                    *row,
                    *column,
                    row_domain.as_deref(),
                    None,
                ),
                None => cross_tab_with_domains(
                    view,
                    *row,
                    *column,
                    row_domain.as_deref(),
                    column_domain.as_deref(),
                ),
            };
            serde_json::to_value(tab)
        }
        QueryCommand::Geo { key } => serde_json::to_value(geo_bin_summary(view, *key)),
        QueryCommand::Overview => serde_json::to_value(overview(view, &VIOLENT_TYPES)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
