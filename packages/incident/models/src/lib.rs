#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident record types shared by the cleaning pipeline and the query
//! engine.
//!
//! A record moves through three shapes:
//!
//! 1. [`NormalizedIncident`]: every field typed, but identity and timestamp
//!    may still be missing.
//! 2. [`ValidatedIncident`]: identity and timestamp guaranteed present.
//! 3. [`Incident`]: validated and enriched with [`TimeFeatures`] derived
//!    from `occurred_at`.
//!
//! The descriptive attributes that pass through untouched live in
//! [`IncidentDetails`], which all three shapes share.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Day of the week, ordered Monday first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// All seven days, Monday through Sunday.
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    /// Zero-based index with Monday = 0 and Sunday = 6.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// Calendar fields derived from an incident timestamp.
///
/// Only constructible from a timestamp, so the fields can never drift from
/// the `occurred_at` they were computed from. The timestamp's own wall-clock
/// representation is used as-is; no timezone conversion happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeFeatures {
    year: i32,
    month: u32,
    hour: u32,
    weekday: Weekday,
}

impl TimeFeatures {
    /// Derives the calendar fields for `timestamp`.
    #[must_use]
    pub fn from_timestamp(timestamp: &NaiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
            hour: timestamp.hour(),
            weekday: timestamp.weekday().into(),
        }
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month, 1-12.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// Hour of day, 0-23.
    #[must_use]
    pub const fn hour(&self) -> u32 {
        self.hour
    }

    /// Day of the week.
    #[must_use]
    pub const fn weekday(&self) -> Weekday {
        self.weekday
    }
}

/// Latitude/longitude rectangle used to reject clearly erroneous geocoding.
///
/// Bounds are inclusive on every side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    /// Box around the Chicago city limits with a generous margin.
    pub const CHICAGO: Self = Self {
        min_lat: 41.0,
        max_lat: 42.5,
        min_lon: -88.5,
        max_lon: -87.0,
    };

    /// Returns `true` if the point lies within the box.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self::CHICAGO
    }
}

/// Descriptive attributes of an incident that pass through validation and
/// feature derivation unchanged.
///
/// Every field is nullable: a value that could not be coerced to its
/// declared type is stored as `None` rather than rejecting the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDetails {
    /// When the source record was last updated.
    pub updated_at: Option<NaiveDateTime>,
    /// Police case number.
    pub case_number: Option<String>,
    /// Block-level address (e.g. "012XX W MADISON ST").
    pub block: Option<String>,
    /// Illinois Uniform Crime Reporting code.
    pub iucr: Option<String>,
    /// Primary offense type (e.g. "THEFT", "BATTERY").
    pub category: Option<String>,
    /// Secondary offense description.
    pub description: Option<String>,
    /// Type of location (e.g. "STREET", "RESIDENCE").
    pub location_description: Option<String>,
    /// Whether an arrest was made. `None` when the source value is unknown.
    pub arrested: Option<bool>,
    /// Whether the incident was domestic. `None` when unknown.
    pub domestic: Option<bool>,
    /// Police beat.
    pub beat: Option<i32>,
    /// Police district.
    pub district: Option<i32>,
    /// City council ward.
    pub ward: Option<i32>,
    /// Community area number.
    pub community_area: Option<i32>,
    /// FBI offense classification code.
    pub fbi_code: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Free-text composite location, e.g. "(41.88, -87.63)".
    pub location: Option<String>,
}

impl IncidentDetails {
    /// Returns `(latitude, longitude)` when both are present.
    #[must_use]
    pub const fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// An incident after per-field type coercion.
///
/// Produced by the normalizer from one raw row. Identity and timestamp are
/// optional here; the validator decides what to keep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIncident {
    /// Source identifier, trimmed. `None` when blank or undecodable.
    pub id: Option<String>,
    /// When the incident occurred. `None` when the date could not be parsed.
    pub occurred_at: Option<NaiveDateTime>,
    /// Remaining attributes.
    pub details: IncidentDetails,
}

/// An incident whose identity and timestamp are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedIncident {
    pub id: String,
    pub occurred_at: NaiveDateTime,
    pub details: IncidentDetails,
}

impl From<ValidatedIncident> for NormalizedIncident {
    fn from(value: ValidatedIncident) -> Self {
        Self {
            id: Some(value.id),
            occurred_at: Some(value.occurred_at),
            details: value.details,
        }
    }
}

/// A fully cleaned incident: validated and enriched with time features.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub occurred_at: NaiveDateTime,
    pub time: TimeFeatures,
    pub details: IncidentDetails,
}

impl Incident {
    /// Builds an incident, deriving its time features from `occurred_at`.
    #[must_use]
    pub fn new(id: String, occurred_at: NaiveDateTime, details: IncidentDetails) -> Self {
        Self {
            time: TimeFeatures::from_timestamp(&occurred_at),
            id,
            occurred_at,
            details,
        }
    }
}

impl From<ValidatedIncident> for Incident {
    fn from(value: ValidatedIncident) -> Self {
        Self::new(value.id, value.occurred_at, value.details)
    }
}

/// A single grouping value extracted from an incident.
///
/// Ordering follows the natural order of each kind: integers numerically,
/// text lexicographically, weekdays Monday first. [`GroupValue::Null`]
/// sorts after every other value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Int(i64),
    Flag(bool),
    Weekday(Weekday),
    Text(String),
    Null,
}

impl GroupValue {
    /// Returns `true` for the null group.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for GroupValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
            Self::Weekday(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Null => f.write_str("UNKNOWN"),
        }
    }
}

impl From<&str> for GroupValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for GroupValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Weekday> for GroupValue {
    fn from(value: Weekday) -> Self {
        Self::Weekday(value)
    }
}

fn text_value(value: Option<&String>) -> GroupValue {
    value.map_or(GroupValue::Null, |s| GroupValue::Text(s.clone()))
}

fn int_value(value: Option<i32>) -> GroupValue {
    value.map_or(GroupValue::Null, |v| GroupValue::Int(i64::from(v)))
}

/// A field of [`Incident`] that aggregations can group by.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupKey {
    Year,
    Month,
    Hour,
    Weekday,
    Category,
    Description,
    LocationDescription,
    District,
    Ward,
    CommunityArea,
    Beat,
    Arrested,
    Domestic,
}

impl GroupKey {
    /// Extracts this key's value from `incident`.
    #[must_use]
    pub fn value_of(self, incident: &Incident) -> GroupValue {
        let d = &incident.details;
        match self {
            Self::Year => GroupValue::Int(i64::from(incident.time.year())),
            Self::Month => GroupValue::Int(i64::from(incident.time.month())),
            Self::Hour => GroupValue::Int(i64::from(incident.time.hour())),
            Self::Weekday => GroupValue::Weekday(incident.time.weekday()),
            Self::Category => text_value(d.category.as_ref()),
            Self::Description => text_value(d.description.as_ref()),
            Self::LocationDescription => text_value(d.location_description.as_ref()),
            Self::District => int_value(d.district),
            Self::Ward => int_value(d.ward),
            Self::CommunityArea => int_value(d.community_area),
            Self::Beat => int_value(d.beat),
            Self::Arrested => d.arrested.map_or(GroupValue::Null, GroupValue::Flag),
            Self::Domestic => d.domestic.map_or(GroupValue::Null, GroupValue::Flag),
        }
    }

    /// The complete value domain for keys that have a fixed one (month,
    /// hour, weekday). `None` for open-ended keys.
    #[must_use]
    pub fn domain(self) -> Option<Vec<GroupValue>> {
        match self {
            Self::Month => Some((1..=12).map(GroupValue::Int).collect()),
            Self::Hour => Some((0..24).map(GroupValue::Int).collect()),
            Self::Weekday => Some(Weekday::ALL.iter().copied().map(GroupValue::from).collect()),
            Self::Arrested | Self::Domestic => {
                Some(vec![GroupValue::Flag(false), GroupValue::Flag(true)])
            }
            _ => None,
        }
    }

    /// Returns `true` for keys whose values are free text.
    #[must_use]
    pub const fn is_categorical(self) -> bool {
        matches!(
            self,
            Self::Category | Self::Description | Self::LocationDescription
        )
    }
}

/// A boolean outcome flag on an incident.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FlagField {
    Arrested,
    Domestic,
}

impl FlagField {
    /// Reads the flag from `incident`. `None` when unknown.
    #[must_use]
    pub const fn value_of(self, incident: &Incident) -> Option<bool> {
        match self {
            Self::Arrested => incident.details.arrested,
            Self::Domestic => incident.details.domestic,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 15, 0)
            .unwrap()
    }

    #[test]
    fn time_features_match_timestamp() {
        // 2024-01-15 was a Monday.
        let features = TimeFeatures::from_timestamp(&at(2024, 1, 15, 23));
        assert_eq!(features.year(), 2024);
        assert_eq!(features.month(), 1);
        assert_eq!(features.hour(), 23);
        assert_eq!(features.weekday(), Weekday::Monday);

        let sunday = TimeFeatures::from_timestamp(&at(2024, 1, 21, 0));
        assert_eq!(sunday.weekday(), Weekday::Sunday);
        assert_eq!(sunday.hour(), 0);
    }

    #[test]
    fn weekday_orders_monday_first() {
        let mut days = vec![Weekday::Sunday, Weekday::Wednesday, Weekday::Monday];
        days.sort();
        assert_eq!(days, vec![Weekday::Monday, Weekday::Wednesday, Weekday::Sunday]);
        assert_eq!(Weekday::Sunday.index(), 6);
        assert_eq!(Weekday::Friday.to_string(), "Friday");
        assert_eq!("Tuesday".parse::<Weekday>().unwrap(), Weekday::Tuesday);
    }

    #[test]
    fn bounds_are_inclusive() {
        let b = GeoBounds::default();
        assert!(b.contains(41.0, -88.5));
        assert!(b.contains(42.5, -87.0));
        assert!(b.contains(41.8781, -87.6298));
        assert!(!b.contains(50.0, -87.6298));
        assert!(!b.contains(41.8781, -86.9));
    }

    #[test]
    fn null_group_sorts_last() {
        let mut values = vec![
            GroupValue::Null,
            GroupValue::Int(12),
            GroupValue::Int(3),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![GroupValue::Int(3), GroupValue::Int(12), GroupValue::Null]
        );

        let mut text = vec![GroupValue::Null, "THEFT".into(), "BATTERY".into()];
        text.sort();
        assert_eq!(text.last(), Some(&GroupValue::Null));
        assert_eq!(text[0], GroupValue::from("BATTERY"));
    }

    #[test]
    fn group_key_extracts_values() {
        let incident = Incident::new(
            "100".to_string(),
            at(2021, 7, 4, 13),
            IncidentDetails {
                category: Some("THEFT".to_string()),
                district: Some(12),
                arrested: Some(true),
                ..IncidentDetails::default()
            },
        );

        assert_eq!(GroupKey::Year.value_of(&incident), GroupValue::Int(2021));
        assert_eq!(GroupKey::Hour.value_of(&incident), GroupValue::Int(13));
        assert_eq!(
            GroupKey::Weekday.value_of(&incident),
            GroupValue::Weekday(Weekday::Sunday)
        );
        assert_eq!(GroupKey::Category.value_of(&incident), "THEFT".into());
        assert_eq!(GroupKey::District.value_of(&incident), GroupValue::Int(12));
        assert_eq!(GroupKey::Ward.value_of(&incident), GroupValue::Null);
        assert_eq!(GroupKey::Arrested.value_of(&incident), GroupValue::Flag(true));
        assert_eq!(FlagField::Domestic.value_of(&incident), None);
    }

    #[test]
    fn group_key_parses_snake_case() {
        assert_eq!(
            "community_area".parse::<GroupKey>().unwrap(),
            GroupKey::CommunityArea
        );
        assert_eq!(GroupKey::LocationDescription.to_string(), "location_description");
        assert!("nope".parse::<GroupKey>().is_err());
    }

    #[test]
    fn fixed_domains() {
        assert_eq!(GroupKey::Hour.domain().unwrap().len(), 24);
        assert_eq!(GroupKey::Month.domain().unwrap().first(), Some(&GroupValue::Int(1)));
        assert_eq!(GroupKey::Weekday.domain().unwrap().len(), 7);
        assert!(GroupKey::District.domain().is_none());
    }
}
