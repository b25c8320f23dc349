#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the crime stats toolchain.
//!
//! `clean` turns a raw CSV export into the cleaned dataset; `summary`,
//! `query`, and `tables` read it back. Without a subcommand an interactive
//! menu offers the same actions.
//!
//! Uses `indicatif-log-bridge` (via [`crime_stats_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{CleanArgs, QueryCommand, Selection};

#[derive(Parser)]
#[command(name = "crime_stats", about = "Crime incident cleaning and query tool")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw CSV export and write the cleaned dataset
    Clean {
        /// TOML pipeline config (overrides `CRIME_STATS_CONFIG`)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Raw CSV export to read
        #[arg(long)]
        input: Option<PathBuf>,
        /// Cleaned `DuckDB` dataset to write
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also export the cleaned table as Parquet
        #[arg(long)]
        parquet: Option<PathBuf>,
    },
    /// Print the row count and date range of the cleaned dataset
    Summary {
        /// Cleaned dataset to read
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// Run one aggregation over the cleaned dataset and print JSON
    Query {
        /// Cleaned dataset to read
        #[arg(long)]
        dataset: Option<PathBuf>,
        #[command(flatten)]
        selection: Selection,
        #[command(subcommand)]
        query: QueryCommand,
    },
    /// Write the standard summary tables as CSV files
    Tables {
        /// Cleaned dataset to read
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Directory to write tables into
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[command(flatten)]
        selection: Selection,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crime_stats_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::Clean {
            config,
            input,
            output,
            parquet,
        } => {
            let args = CleanArgs {
                config,
                input,
                output,
                parquet,
            };
            commands::clean(&args, &multi)?;
        }
        Commands::Summary { dataset } => commands::summary(dataset.as_deref())?,
        Commands::Query {
            dataset,
            selection,
            query,
        } => commands::query(dataset.as_deref(), &selection, &query)?,
        Commands::Tables {
            dataset,
            out_dir,
            selection,
        } => commands::tables(dataset.as_deref(), out_dir.as_deref(), &selection)?,
    }

    Ok(())
}
