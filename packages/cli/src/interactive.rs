#![allow(clippy::module_name_repetitions)]

//! Interactive menu for the crime stats toolchain.
//!
//! Provides a menu-driven interface using `dialoguer` for running the same
//! commands without memorizing CLI flags.

use std::path::PathBuf;

use crime_stats_cli_utils::MultiProgress;
use crime_stats_database::paths;
use crime_stats_incident_models::{FlagField, GroupKey};
use dialoguer::{Confirm, Input, Select};

use crate::commands::{self, CleanArgs, QueryCommand, Selection};

/// Top-level actions available in the interactive menu.
enum Action {
    Clean,
    Summary,
    Query,
    Tables,
}

impl Action {
    const ALL: &[Self] = &[Self::Clean, Self::Summary, Self::Query, Self::Tables];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Clean => "Clean raw export",
            Self::Summary => "Show dataset summary",
            Self::Query => "Run a query",
            Self::Tables => "Write summary tables",
        }
    }
}

/// Query kinds offered by the menu.
enum QueryKind {
    Counts,
    Top,
    Rates,
    Crosstab,
    Geo,
    Overview,
}

impl QueryKind {
    const ALL: &[Self] = &[
        Self::Counts,
        Self::Top,
        Self::Rates,
        Self::Crosstab,
        Self::Geo,
        Self::Overview,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Counts => "Counts per group",
            Self::Top => "Top values",
            Self::Rates => "Arrest/domestic rate per group",
            Self::Crosstab => "Cross-tabulation",
            Self::Geo => "Centroids per area",
            Self::Overview => "Overview",
        }
    }
}

const KEYS: &[GroupKey] = &[
    GroupKey::Year,
    GroupKey::Month,
    GroupKey::Hour,
    GroupKey::Weekday,
    GroupKey::Category,
    GroupKey::Description,
    GroupKey::LocationDescription,
    GroupKey::District,
    GroupKey::Ward,
    GroupKey::CommunityArea,
    GroupKey::Beat,
    GroupKey::Arrested,
    GroupKey::Domestic,
];

const SPATIAL_KEYS: &[GroupKey] = &[
    GroupKey::District,
    GroupKey::CommunityArea,
    GroupKey::Ward,
    GroupKey::Beat,
];

/// Runs the interactive menu, prompting the user to select and configure
/// one command.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected command fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Crime Stats Toolchain");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Clean => {
            let input: String = Input::new()
                .with_prompt("Raw CSV export")
                .default(paths::raw_csv_path().display().to_string())
                .interact_text()?;
            let output: String = Input::new()
                .with_prompt("Cleaned dataset")
                .default(paths::cleaned_dataset_path().display().to_string())
                .interact_text()?;
            let parquet = Confirm::new()
                .with_prompt("Also export Parquet?")
                .default(false)
                .interact()?
                .then(|| PathBuf::from(&output).with_extension("parquet"));

            let args = CleanArgs {
                config: None,
                input: Some(PathBuf::from(input)),
                output: Some(PathBuf::from(output)),
                parquet,
            };
            commands::clean(&args, multi)?;
        }
        Action::Summary => commands::summary(None)?,
        Action::Query => {
            let selection = prompt_selection()?;
            let query = prompt_query()?;
            commands::query(None, &selection, &query)?;
        }
        Action::Tables => {
            let out_dir: String = Input::new()
                .with_prompt("Output directory")
                .default(paths::tables_dir().display().to_string())
                .interact_text()?;
            let selection = prompt_selection()?;
            commands::tables(None, Some(&PathBuf::from(out_dir)), &selection)?;
        }
    }

    Ok(())
}

const YEAR_HINT: &str = "Enter a year, or leave blank";

fn prompt_optional_number<T: std::str::FromStr>(
    prompt: &str,
    hint: &'static str,
) -> Result<Option<T>, dialoguer::Error> {
    let text: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .validate_with(|s: &String| -> Result<(), &'static str> {
            if s.trim().is_empty() || s.trim().parse::<T>().is_ok() {
                Ok(())
            } else {
                Err(hint)
            }
        })
        .interact_text()?;
    Ok(text.trim().parse().ok())
}

fn prompt_selection() -> Result<Selection, dialoguer::Error> {
    let from = prompt_optional_number("First year (blank for all)", YEAR_HINT)?;
    let to = prompt_optional_number("Last year (blank for all)", YEAR_HINT)?;
    let category: String = Input::new()
        .with_prompt("Primary type (blank for all)")
        .allow_empty(true)
        .interact_text()?;
    let district = prompt_optional_number(
        "Police district (blank for all)",
        "Enter a district number, or leave blank",
    )?;

    Ok(selection_from_answers(from, to, &category, district))
}

/// Builds a [`Selection`] from menu answers. A blank primary type selects
/// every type.
fn selection_from_answers(
    from: Option<i32>,
    to: Option<i32>,
    category: &str,
    district: Option<i64>,
) -> Selection {
    Selection {
        from,
        to,
        category: Some(category.trim().to_uppercase()).filter(|c| !c.is_empty()),
        district,
    }
}

fn select_key(
    prompt: &str,
    keys: &[GroupKey],
    default: usize,
) -> Result<GroupKey, dialoguer::Error> {
    let labels: Vec<String> = keys.iter().map(ToString::to_string).collect();
    let idx = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(default)
        .interact()?;
    Ok(keys[idx])
}

fn prompt_query() -> Result<QueryCommand, dialoguer::Error> {
    let labels: Vec<&str> = QueryKind::ALL.iter().map(QueryKind::label).collect();
    let idx = Select::new()
        .with_prompt("Which query?")
        .items(&labels)
        .default(0)
        .interact()?;

    let category_idx = KEYS
        .iter()
        .position(|k| *k == GroupKey::Category)
        .unwrap_or(0);

    Ok(match QueryKind::ALL[idx] {
        QueryKind::Counts => {
            let key = select_key("Group by", KEYS, 0)?;
            let dense = key.domain().is_some()
                && Confirm::new()
                    .with_prompt("Include empty groups?")
                    .default(true)
                    .interact()?;
            QueryCommand::Counts {
                keys: vec![key],
                dense,
            }
        }
        QueryKind::Top => {
            let key = select_key("Rank which field?", KEYS, category_idx)?;
            let n: usize = Input::new()
                .with_prompt("How many?")
                .default(10)
                .interact_text()?;
            let overflow = Confirm::new()
                .with_prompt("Group the rest as OTHERS?")
                .default(false)
                .interact()?;
            QueryCommand::Top { key, n, overflow }
        }
        QueryKind::Rates => {
            let flags = [FlagField::Arrested, FlagField::Domestic];
            let flag_labels: Vec<String> = flags.iter().map(ToString::to_string).collect();
            let flag_idx = Select::new()
                .with_prompt("Which flag?")
                .items(&flag_labels)
                .default(0)
                .interact()?;
            let key = select_key("Group by", KEYS, category_idx)?;
            QueryCommand::Rates {
                flag: flags[flag_idx],
                key,
            }
        }
        QueryKind::Crosstab => {
            let row = select_key("Rows", KEYS, 0)?;
            let column = select_key("Columns", KEYS, category_idx)?;
            let top: usize = Input::new()
                .with_prompt("Limit columns to top N (0 for all)")
                .default(0)
                .interact_text()?;
            QueryCommand::Crosstab {
                row,
                column,
                top: (top > 0).then_some(top),
                dense: true,
            }
        }
        QueryKind::Geo => QueryCommand::Geo {
            key: select_key("Area", SPATIAL_KEYS, 0)?,
        },
        QueryKind::Overview => QueryCommand::Overview,
    })
}
