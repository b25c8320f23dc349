//! Raw row normalization.
//!
//! Maps trimmed CSV header names to known columns and coerces each field to
//! its declared type. Coercion never fails: a value that cannot be parsed
//! becomes `None` and the validator decides whether the row survives.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SubsecRound};
use crime_stats_incident_models::{IncidentDetails, NormalizedIncident};
use csv::ByteRecord;
use strum_macros::{AsRefStr, EnumString};

use crate::CleanError;

/// A column of the raw export that the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum RawColumn {
    #[strum(serialize = "ID")]
    Id,
    #[strum(serialize = "Case Number")]
    CaseNumber,
    #[strum(serialize = "Date")]
    Date,
    #[strum(serialize = "Block")]
    Block,
    #[strum(serialize = "IUCR")]
    Iucr,
    #[strum(serialize = "Primary Type")]
    PrimaryType,
    #[strum(serialize = "Description")]
    Description,
    #[strum(serialize = "Location Description")]
    LocationDescription,
    #[strum(serialize = "Arrest")]
    Arrest,
    #[strum(serialize = "Domestic")]
    Domestic,
    #[strum(serialize = "Beat")]
    Beat,
    #[strum(serialize = "District")]
    District,
    #[strum(serialize = "Ward")]
    Ward,
    #[strum(serialize = "Community Area")]
    CommunityArea,
    #[strum(serialize = "FBI Code")]
    FbiCode,
    #[strum(serialize = "Updated On")]
    UpdatedOn,
    #[strum(serialize = "Latitude")]
    Latitude,
    #[strum(serialize = "Longitude")]
    Longitude,
    #[strum(serialize = "Location")]
    Location,
}

/// Columns without which no record could ever pass validation.
const REQUIRED_COLUMNS: [RawColumn; 2] = [RawColumn::Id, RawColumn::Date];

/// Position of each known column within a raw record.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    positions: BTreeMap<RawColumn, usize>,
}

impl ColumnMap {
    /// Builds the map from a header record. Names are trimmed before
    /// matching; unknown columns are ignored and the first occurrence of a
    /// duplicated column wins.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError::MissingColumn`] if `ID` or `Date` is absent.
    pub fn from_headers(headers: &ByteRecord) -> Result<Self, CleanError> {
        let mut positions = BTreeMap::new();

        for (idx, raw) in headers.iter().enumerate() {
            let Ok(name) = std::str::from_utf8(raw) else {
                log::warn!("Ignoring header #{idx}: not valid UTF-8");
                continue;
            };
            let name = name.trim().trim_start_matches('\u{feff}').trim();
            match name.parse::<RawColumn>() {
                Ok(column) => {
                    positions.entry(column).or_insert(idx);
                }
                Err(_) => log::debug!("Ignoring unrecognized column {name:?}"),
            }
        }

        for column in REQUIRED_COLUMNS {
            if !positions.contains_key(&column) {
                return Err(CleanError::MissingColumn {
                    column: column.as_ref().to_string(),
                });
            }
        }

        Ok(Self { positions })
    }

    /// Returns `true` if the header contained `column`.
    #[must_use]
    pub fn contains(&self, column: RawColumn) -> bool {
        self.positions.contains_key(&column)
    }
}

/// One raw record viewed through a [`ColumnMap`].
pub struct RawRow<'a> {
    columns: &'a ColumnMap,
    record: &'a ByteRecord,
}

impl<'a> RawRow<'a> {
    #[must_use]
    pub const fn new(columns: &'a ColumnMap, record: &'a ByteRecord) -> Self {
        Self { columns, record }
    }

    /// Returns the field text for `column`.
    ///
    /// `None` when the column is absent from the header, the record is too
    /// short, or the bytes are not valid UTF-8.
    #[must_use]
    pub fn get(&self, column: RawColumn) -> Option<&'a str> {
        let idx = *self.columns.positions.get(&column)?;
        std::str::from_utf8(self.record.get(idx)?).ok()
    }
}

/// Coerces one raw row into a [`NormalizedIncident`].
#[must_use]
pub fn normalize_row(row: &RawRow<'_>) -> NormalizedIncident {
    let text = |column| parse_text(row.get(column));
    let code = |column| parse_int_code(row.get(column));

    NormalizedIncident {
        id: text(RawColumn::Id),
        occurred_at: row.get(RawColumn::Date).and_then(parse_timestamp),
        details: IncidentDetails {
            updated_at: row.get(RawColumn::UpdatedOn).and_then(parse_timestamp),
            case_number: text(RawColumn::CaseNumber),
            block: text(RawColumn::Block),
            iucr: text(RawColumn::Iucr),
            category: text(RawColumn::PrimaryType),
            description: text(RawColumn::Description),
            location_description: text(RawColumn::LocationDescription),
            arrested: parse_flag(row.get(RawColumn::Arrest)),
            domestic: parse_flag(row.get(RawColumn::Domestic)),
            beat: code(RawColumn::Beat),
            district: code(RawColumn::District),
            ward: code(RawColumn::Ward),
            community_area: code(RawColumn::CommunityArea),
            fbi_code: text(RawColumn::FbiCode),
            latitude: parse_f64(row.get(RawColumn::Latitude)),
            longitude: parse_f64(row.get(RawColumn::Longitude)),
            location: text(RawColumn::Location),
        },
    }
}

/// Timestamp layouts tried in order. The first is the city portal export.
const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Years the cleaned dataset can store and read back.
pub const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// Fractional-second digits kept; the dataset stores microseconds.
const SUBSEC_DIGITS: u16 = 6;

/// Parses free-form date/time text.
///
/// Offsets are accepted but discarded: the wall-clock time as written is
/// kept, never converted. Bare dates resolve to midnight. Sub-microsecond
/// digits are truncated, and years outside [`STORABLE_YEARS`] are treated
/// as unparseable.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let dt = parse_wall_clock(s)?;
    if !STORABLE_YEARS.contains(&dt.year()) {
        log::debug!("Timestamp {s:?} is outside the storable year range");
        return None;
    }
    Some(dt.trunc_subsecs(SUBSEC_DIGITS))
}

fn parse_wall_clock(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.naive_local());
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Trims a text field; blank becomes `None`.
#[must_use]
pub fn parse_text(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Parses a finite float, tolerating thousands separators.
#[must_use]
pub fn parse_f64(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let value = s.replace(',', "").parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Parses an integral code such as a district or beat number.
///
/// Accepts float spellings of whole numbers (`"12.0"`), which is how
/// spreadsheet round-trips tend to emit them.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_int_code(s: Option<&str>) -> Option<i32> {
    let value = parse_f64(s)?;
    if value.fract() != 0.0 || value < f64::from(i32::MIN) || value > f64::from(i32::MAX) {
        return None;
    }
    Some(value as i32)
}

/// Parses a boolean flag. Unrecognized spellings are unknown, not false.
#[must_use]
pub fn parse_flag(s: Option<&str>) -> Option<bool> {
    match s?.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    fn headers(names: &[&str]) -> ByteRecord {
        ByteRecord::from(names.to_vec())
    }

    #[test]
    fn trims_header_names() {
        let map = ColumnMap::from_headers(&headers(&[" ID ", "Date  ", "\tPrimary Type", "X Coordinate"]))
            .unwrap();
        assert!(map.contains(RawColumn::Id));
        assert!(map.contains(RawColumn::Date));
        assert!(map.contains(RawColumn::PrimaryType));
        assert!(!map.contains(RawColumn::Latitude));
    }

    #[test]
    fn strips_byte_order_mark() {
        let map = ColumnMap::from_headers(&headers(&["\u{feff}ID", "Date"])).unwrap();
        assert!(map.contains(RawColumn::Id));
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let err = ColumnMap::from_headers(&headers(&["ID", "Primary Type"])).unwrap_err();
        assert!(matches!(err, CleanError::MissingColumn { column } if column == "Date"));
    }

    #[test]
    fn normalizes_full_row() {
        let map = ColumnMap::from_headers(&headers(&[
            "ID",
            "Date",
            "Primary Type",
            "Arrest",
            "District",
            "Latitude",
            "Longitude",
            "Updated On",
        ]))
        .unwrap();
        let record = ByteRecord::from(vec![
            " 100 ",
            "01/15/2024 02:30:00 PM",
            "THEFT",
            "true",
            "012",
            "41.8781",
            "-87.6298",
            "garbage",
        ]);

        let incident = normalize_row(&RawRow::new(&map, &record));
        assert_eq!(incident.id.as_deref(), Some("100"));
        let occurred = incident.occurred_at.unwrap();
        assert_eq!(occurred.hour(), 14);
        assert_eq!(occurred.day(), 15);
        assert_eq!(incident.details.category.as_deref(), Some("THEFT"));
        assert_eq!(incident.details.arrested, Some(true));
        assert_eq!(incident.details.domestic, None);
        assert_eq!(incident.details.district, Some(12));
        assert_eq!(incident.details.coordinates(), Some((41.8781, -87.6298)));
        assert_eq!(incident.details.updated_at, None);
    }

    #[test]
    fn malformed_encoding_becomes_null() {
        let map = ColumnMap::from_headers(&headers(&["ID", "Date", "Description"])).unwrap();
        let mut record = ByteRecord::new();
        record.push_field(b"7");
        record.push_field(b"2020-03-01 08:00:00");
        record.push_field(&[0xff, 0xfe, b'A']);

        let incident = normalize_row(&RawRow::new(&map, &record));
        assert_eq!(incident.id.as_deref(), Some("7"));
        assert!(incident.occurred_at.is_some());
        assert_eq!(incident.details.description, None);
    }

    #[test]
    fn short_record_yields_nulls() {
        let map = ColumnMap::from_headers(&headers(&["ID", "Date", "Ward"])).unwrap();
        let record = ByteRecord::from(vec!["9"]);
        let incident = normalize_row(&RawRow::new(&map, &record));
        assert_eq!(incident.id.as_deref(), Some("9"));
        assert_eq!(incident.occurred_at, None);
        assert_eq!(incident.details.ward, None);
    }

    #[test]
    fn parses_timestamp_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        for s in [
            "01/15/2024 02:30:00 PM",
            "01/15/2024 2:30 PM",
            "01/15/2024 14:30:00",
            "2024-01-15T14:30:00.000",
            "2024-01-15T14:30:00",
            "2024-01-15 14:30:00",
            "2024-01-15T14:30:00-06:00",
            "  2024-01-15 14:30  ",
        ] {
            assert_eq!(parse_timestamp(s), Some(expected), "failed on {s:?}");
        }
    }

    #[test]
    fn offset_keeps_wall_clock_time() {
        let dt = parse_timestamp("2024-07-04T23:10:00+05:00").unwrap();
        assert_eq!(dt.hour(), 23);
        assert_eq!(dt.day(), 4);
    }

    #[test]
    fn bare_date_is_midnight() {
        let dt = parse_timestamp("2019-12-31").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2019, 12, 31, 0));
        assert!(parse_timestamp("12/31/2019").is_some());
    }

    #[test]
    fn rejects_unparseable_timestamps() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("not-a-date"), None);
        assert_eq!(parse_timestamp("13/45/2020 10:00:00 AM"), None);
    }

    #[test]
    fn rejects_years_outside_storable_range() {
        assert_eq!(parse_timestamp("0000-03-01 10:00:00"), None);
        assert_eq!(parse_timestamp("-0044-03-15 12:00:00"), None);
        assert_eq!(parse_timestamp("+10000-01-01 00:00:00"), None);
        assert!(parse_timestamp("0001-01-01 00:00:00").is_some());
        assert!(parse_timestamp("9999-12-31 23:59:59").is_some());
    }

    #[test]
    fn truncates_to_microseconds() {
        let dt = parse_timestamp("2024-01-15T14:30:00.123456789").unwrap();
        assert_eq!(dt.nanosecond(), 123_456_000);
        let dt = parse_timestamp("2024-01-15 14:30:00.5").unwrap();
        assert_eq!(dt.nanosecond(), 500_000_000);
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(parse_f64(Some(" 41.9 ")), Some(41.9));
        assert_eq!(parse_f64(Some("1,234.5")), Some(1234.5));
        assert_eq!(parse_f64(Some("abc")), None);
        assert_eq!(parse_f64(Some("NaN")), None);
        assert_eq!(parse_f64(Some("")), None);
        assert_eq!(parse_f64(None), None);

        assert_eq!(parse_int_code(Some("12.0")), Some(12));
        assert_eq!(parse_int_code(Some("0421")), Some(421));
        assert_eq!(parse_int_code(Some("12.5")), None);
        assert_eq!(parse_int_code(Some("99999999999")), None);
    }

    #[test]
    fn flag_coercion() {
        assert_eq!(parse_flag(Some("TRUE")), Some(true));
        assert_eq!(parse_flag(Some("false")), Some(false));
        assert_eq!(parse_flag(Some(" Y ")), Some(true));
        assert_eq!(parse_flag(Some("0")), Some(false));
        assert_eq!(parse_flag(Some("maybe")), None);
        assert_eq!(parse_flag(None), None);
    }
}
