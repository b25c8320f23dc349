//! The cleaned incident dataset file.
//!
//! One `DuckDB` file with an `incidents` table (cleaned column names plus the
//! derived `Year`/`Month`/`Hour`/`Weekday` columns) and a `_meta` key/value
//! table. Writing replaces the file wholesale: rows go to a sibling temp file
//! that is renamed over the target only after a successful checkpoint.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use crime_stats_incident_models::{Incident, IncidentDetails, TimeFeatures, Weekday};
use duckdb::Connection;
use serde::Serialize;

use crate::DbError;
use crate::paths::{ensure_dir, remove_if_exists, with_suffix};

/// Rows per multi-row INSERT statement.
const CHUNK_SIZE: usize = 2_000;

/// Bound parameters per incident row.
const COLUMNS_PER_ROW: usize = 23;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const CREATE_SCHEMA: &str = r#"
CREATE TABLE incidents (
    "ID" TEXT NOT NULL PRIMARY KEY,
    "Case Number" TEXT,
    "Date" TIMESTAMP NOT NULL,
    "Block" TEXT,
    "IUCR" TEXT,
    "Primary Type" TEXT,
    "Description" TEXT,
    "Location Description" TEXT,
    "Arrest" BOOLEAN,
    "Domestic" BOOLEAN,
    "Beat" INTEGER,
    "District" INTEGER,
    "Ward" INTEGER,
    "Community Area" INTEGER,
    "FBI Code" TEXT,
    "Updated On" TIMESTAMP,
    "Latitude" DOUBLE,
    "Longitude" DOUBLE,
    "Location" TEXT,
    "Year" INTEGER NOT NULL,
    "Month" INTEGER NOT NULL,
    "Hour" INTEGER NOT NULL,
    "Weekday" TEXT NOT NULL
);

CREATE TABLE _meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const INSERT_PREFIX: &str = r#"INSERT INTO incidents (
    "ID", "Case Number", "Date", "Block", "IUCR", "Primary Type",
    "Description", "Location Description", "Arrest", "Domestic",
    "Beat", "District", "Ward", "Community Area", "FBI Code",
    "Updated On", "Latitude", "Longitude", "Location",
    "Year", "Month", "Hour", "Weekday"
) VALUES "#;

const ROW_PLACEHOLDER: &str = "(?, ?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
     CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?)";

const SELECT_INCIDENTS: &str = r#"SELECT
    "ID", "Case Number", CAST("Date" AS VARCHAR), "Block", "IUCR", "Primary Type",
    "Description", "Location Description", "Arrest", "Domestic",
    "Beat", "District", "Ward", "Community Area", "FBI Code",
    CAST("Updated On" AS VARCHAR), "Latitude", "Longitude", "Location",
    "Year", "Month", "Hour", "Weekday"
FROM incidents
ORDER BY rowid"#;

/// Row count and observed date range of a cleaned dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub row_count: u64,
    pub min_occurred_at: Option<NaiveDateTime>,
    pub max_occurred_at: Option<NaiveDateTime>,
}

impl DatasetSummary {
    /// Computes the summary of an in-memory record set.
    #[must_use]
    pub fn of(incidents: &[Incident]) -> Self {
        Self {
            row_count: incidents.len() as u64,
            min_occurred_at: incidents.iter().map(|i| i.occurred_at).min(),
            max_occurred_at: incidents.iter().map(|i| i.occurred_at).max(),
        }
    }
}

/// Writes `incidents` to a fresh dataset at `path`, replacing any existing
/// file. When `parquet` is set, the table is also exported there.
///
/// Row order is preserved: [`load_dataset`] returns records in the order
/// they were written.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be created or written. The
/// previous dataset at `path`, if any, is left untouched on error.
pub fn write_dataset(
    path: &Path,
    incidents: &[Incident],
    parquet: Option<&Path>,
) -> Result<DatasetSummary, DbError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let tmp = with_suffix(path, ".tmp");
    remove_db_files(&tmp)?;

    let summary = match write_tmp(&tmp, incidents, parquet) {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(cleanup) = remove_db_files(&tmp) {
                log::warn!("Failed to remove {}: {cleanup}", tmp.display());
            }
            return Err(e);
        }
    };

    remove_if_exists(&with_suffix(path, ".wal"))?;
    std::fs::rename(&tmp, path)?;

    log::info!(
        "Wrote {} rows to {}",
        summary.row_count,
        path.display()
    );

    Ok(summary)
}

fn write_tmp(
    tmp: &Path,
    incidents: &[Incident],
    parquet: Option<&Path>,
) -> Result<DatasetSummary, DbError> {
    let conn = Connection::open(tmp)?;
    conn.execute_batch(CREATE_SCHEMA)?;

    conn.execute_batch("BEGIN TRANSACTION")?;
    let inserted = insert_incidents(&conn, incidents)?;
    let summary = DatasetSummary::of(incidents);
    set_meta(&conn, "row_count", &summary.row_count.to_string())?;
    if let Some(min) = summary.min_occurred_at {
        set_meta(&conn, "min_occurred_at", &min.format(TIMESTAMP_FORMAT).to_string())?;
    }
    if let Some(max) = summary.max_occurred_at {
        set_meta(&conn, "max_occurred_at", &max.format(TIMESTAMP_FORMAT).to_string())?;
    }
    conn.execute_batch("COMMIT")?;

    if inserted != summary.row_count {
        return Err(DbError::Conversion {
            message: format!(
                "inserted {inserted} rows but expected {}",
                summary.row_count
            ),
        });
    }

    if let Some(parquet) = parquet {
        export_parquet(&conn, parquet)?;
    }

    conn.execute_batch("CHECKPOINT")?;
    drop(conn);

    Ok(summary)
}

fn insert_incidents(conn: &Connection, incidents: &[Incident]) -> Result<u64, DbError> {
    let mut total = 0u64;

    for chunk in incidents.chunks(CHUNK_SIZE) {
        let mut sql = String::with_capacity(
            INSERT_PREFIX.len() + chunk.len() * (ROW_PLACEHOLDER.len() + 2),
        );
        sql.push_str(INSERT_PREFIX);
        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(ROW_PLACEHOLDER);
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut idx = 1usize;

        for incident in chunk {
            let d = &incident.details;
            let time = incident.time;

            stmt.raw_bind_parameter(idx, &incident.id)?;
            stmt.raw_bind_parameter(idx + 1, d.case_number.as_deref())?;
            stmt.raw_bind_parameter(
                idx + 2,
                incident.occurred_at.format(TIMESTAMP_FORMAT).to_string(),
            )?;
            stmt.raw_bind_parameter(idx + 3, d.block.as_deref())?;
            stmt.raw_bind_parameter(idx + 4, d.iucr.as_deref())?;
            stmt.raw_bind_parameter(idx + 5, d.category.as_deref())?;
            stmt.raw_bind_parameter(idx + 6, d.description.as_deref())?;
            stmt.raw_bind_parameter(idx + 7, d.location_description.as_deref())?;
            stmt.raw_bind_parameter(idx + 8, d.arrested)?;
            stmt.raw_bind_parameter(idx + 9, d.domestic)?;
            stmt.raw_bind_parameter(idx + 10, d.beat)?;
            stmt.raw_bind_parameter(idx + 11, d.district)?;
            stmt.raw_bind_parameter(idx + 12, d.ward)?;
            stmt.raw_bind_parameter(idx + 13, d.community_area)?;
            stmt.raw_bind_parameter(idx + 14, d.fbi_code.as_deref())?;
            stmt.raw_bind_parameter(
                idx + 15,
                d.updated_at.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            )?;
            stmt.raw_bind_parameter(idx + 16, d.latitude)?;
            stmt.raw_bind_parameter(idx + 17, d.longitude)?;
            stmt.raw_bind_parameter(idx + 18, d.location.as_deref())?;
            stmt.raw_bind_parameter(idx + 19, time.year())?;
            stmt.raw_bind_parameter(idx + 20, time.month())?;
            stmt.raw_bind_parameter(idx + 21, time.hour())?;
            stmt.raw_bind_parameter(idx + 22, time.weekday().to_string())?;

            idx += COLUMNS_PER_ROW;
        }

        let rows = stmt.raw_execute()?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

fn export_parquet(conn: &Connection, target: &Path) -> Result<(), DbError> {
    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }

    let tmp = with_suffix(target, ".tmp");
    remove_if_exists(&tmp)?;

    let literal = tmp.display().to_string().replace('\'', "''");
    let result = conn.execute_batch(&format!(
        "COPY (SELECT * FROM incidents ORDER BY rowid) TO '{literal}' (FORMAT PARQUET)"
    ));
    if let Err(e) = result {
        remove_if_exists(&tmp)?;
        return Err(e.into());
    }

    std::fs::rename(&tmp, target)?;
    log::info!("Exported Parquet copy to {}", target.display());
    Ok(())
}

/// Removes a database file and its write-ahead log.
fn remove_db_files(path: &Path) -> Result<(), DbError> {
    remove_if_exists(path)?;
    remove_if_exists(&with_suffix(path, ".wal"))?;
    Ok(())
}

/// Opens an existing dataset read-only.
///
/// # Errors
///
/// Returns [`DbError::MissingDataset`] if `path` does not exist, or a
/// [`DbError::DuckDb`] error if it cannot be opened.
pub fn open_read_only(path: &Path) -> Result<Connection, DbError> {
    if !path.exists() {
        return Err(DbError::MissingDataset {
            path: PathBuf::from(path),
        });
    }

    let config = duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

/// Loads every incident from the dataset at `path`, in stored order.
///
/// The stored `Year`/`Month`/`Hour`/`Weekday` columns are checked against
/// the values recomputed from `Date`.
///
/// # Errors
///
/// Returns [`DbError`] if the dataset is missing or unreadable, or if a
/// stored row is inconsistent.
pub fn load_dataset(path: &Path) -> Result<Vec<Incident>, DbError> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare(SELECT_INCIDENTS)?;

    let rows = stmt.query_map([], |row| {
        Ok(StoredRow {
            id: row.get(0)?,
            occurred_at: row.get(2)?,
            updated_at: row.get(15)?,
            year: row.get(19)?,
            month: row.get(20)?,
            hour: row.get(21)?,
            weekday: row.get(22)?,
            details: IncidentDetails {
                updated_at: None,
                case_number: row.get(1)?,
                block: row.get(3)?,
                iucr: row.get(4)?,
                category: row.get(5)?,
                description: row.get(6)?,
                location_description: row.get(7)?,
                arrested: row.get(8)?,
                domestic: row.get(9)?,
                beat: row.get(10)?,
                district: row.get(11)?,
                ward: row.get(12)?,
                community_area: row.get(13)?,
                fbi_code: row.get(14)?,
                latitude: row.get(16)?,
                longitude: row.get(17)?,
                location: row.get(18)?,
            },
        })
    })?;

    let mut incidents = Vec::new();
    for row in rows {
        incidents.push(row?.into_incident()?);
    }

    log::info!("Loaded {} rows from {}", incidents.len(), path.display());
    Ok(incidents)
}

/// Raw column values of one stored row before conversion.
struct StoredRow {
    id: String,
    occurred_at: String,
    updated_at: Option<String>,
    year: i64,
    month: i64,
    hour: i64,
    weekday: String,
    details: IncidentDetails,
}

impl StoredRow {
    fn into_incident(self) -> Result<Incident, DbError> {
        let occurred_at = parse_timestamp(&self.occurred_at).ok_or_else(|| DbError::Conversion {
            message: format!("row {}: unreadable Date {:?}", self.id, self.occurred_at),
        })?;

        let updated_at = match self.updated_at {
            Some(s) => Some(parse_timestamp(&s).ok_or_else(|| DbError::Conversion {
                message: format!("row {}: unreadable Updated On {s:?}", self.id),
            })?),
            None => None,
        };

        let weekday: Weekday = self.weekday.parse().map_err(|_| DbError::Conversion {
            message: format!("row {}: unknown Weekday {:?}", self.id, self.weekday),
        })?;

        let expected = TimeFeatures::from_timestamp(&occurred_at);
        let stored_matches = self.year == i64::from(expected.year())
            && self.month == i64::from(expected.month())
            && self.hour == i64::from(expected.hour())
            && weekday == expected.weekday();
        if !stored_matches {
            return Err(DbError::Conversion {
                message: format!(
                    "row {}: derived columns disagree with Date {occurred_at}",
                    self.id
                ),
            });
        }

        Ok(Incident::new(
            self.id,
            occurred_at,
            IncidentDetails {
                updated_at,
                ..self.details
            },
        ))
    }
}

/// Reads the row count and date range recorded in `_meta`.
///
/// # Errors
///
/// Returns [`DbError`] if the dataset is missing or its metadata is
/// unreadable.
pub fn read_summary(path: &Path) -> Result<DatasetSummary, DbError> {
    let conn = open_read_only(path)?;

    let row_count = match get_meta(&conn, "row_count")? {
        Some(v) => v.parse().map_err(|_| DbError::Conversion {
            message: format!("invalid row_count {v:?}"),
        })?,
        None => get_record_count(&conn)?,
    };

    let timestamp = |key: &str| -> Result<Option<NaiveDateTime>, DbError> {
        get_meta(&conn, key)?.map_or(Ok(None), |v| {
            parse_timestamp(&v)
                .map(Some)
                .ok_or_else(|| DbError::Conversion {
                    message: format!("invalid {key} {v:?}"),
                })
        })
    };

    Ok(DatasetSummary {
        row_count,
        min_occurred_at: timestamp("min_occurred_at")?,
        max_occurred_at: timestamp("max_occurred_at")?,
    })
}

/// Returns the number of rows in the `incidents` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_record_count(conn: &Connection) -> Result<u64, DbError> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM incidents")?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    match stmt.query_row([key], |row| row.get(0)) {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

/// Parses `DuckDB`'s text rendering of a `TIMESTAMP`, which includes
/// fractional seconds only when they are non-zero.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}
