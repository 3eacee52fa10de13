#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Collision record types, derived attributes, and filter definitions.
//!
//! This crate defines the logical schema shared by every dataset backend.
//! One [`CollisionRecord`] describes one person involved in one collision;
//! all person-rows of the same physical crash share a `collision_id`.

pub mod filter;

use chrono::{Datelike as _, NaiveDateTime, Timelike as _};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use filter::{CollisionFilter, FilterSpec, InvalidFilterError};

/// Canonical column names of the collision dataset.
///
/// The CSV loader matches headers against these names and the relational
/// backend stores its columns under them.
pub mod columns {
    /// Collision identifier shared by all person-rows of a crash.
    pub const COLLISION_ID: &str = "COLLISION_ID";
    /// Crash timestamp.
    pub const CRASH_DATE: &str = "CRASH_DATE";
    /// Calendar year derived from the crash timestamp.
    pub const YEAR: &str = "YEAR";
    /// Hour of day (0-23).
    pub const HOUR: &str = "HOUR";
    /// Day of week (0 = Monday).
    pub const DAY: &str = "DAY";
    /// Season label.
    pub const SEASON: &str = "season";
    /// Borough name.
    pub const BOROUGH: &str = "BOROUGH";
    /// WGS84 latitude.
    pub const LATITUDE: &str = "LATITUDE";
    /// WGS84 longitude.
    pub const LONGITUDE: &str = "LONGITUDE";
    /// Primary vehicle type.
    pub const VEHICLE_TYPE: &str = "VEHICLE TYPE CODE 1";
    /// Primary contributing factor.
    pub const CONTRIBUTING_FACTOR: &str = "CONTRIBUTING FACTOR VEHICLE 1";
    /// Person identifier.
    pub const PERSON_ID: &str = "PERSON_ID";
    /// Person type (Pedestrian, Cyclist, Occupant, ...).
    pub const PERSON_TYPE: &str = "PERSON_TYPE";
    /// Injury status (Killed, Injured, Unspecified, ...).
    pub const PERSON_INJURY: &str = "PERSON_INJURY";
    /// Collision-level injured counter.
    pub const PERSONS_INJURED: &str = "NUMBER OF PERSONS INJURED";
    /// Collision-level killed counter.
    pub const PERSONS_KILLED: &str = "NUMBER OF PERSONS KILLED";
    /// Safety equipment flag (1 = used, 0 = not used).
    pub const SAFETY_USED: &str = "SAFETY_USED";

    /// Every column of the logical schema, in storage order.
    pub const ALL: &[&str] = &[
        COLLISION_ID,
        CRASH_DATE,
        YEAR,
        HOUR,
        DAY,
        SEASON,
        BOROUGH,
        LATITUDE,
        LONGITUDE,
        VEHICLE_TYPE,
        CONTRIBUTING_FACTOR,
        PERSON_ID,
        PERSON_TYPE,
        PERSON_INJURY,
        PERSONS_INJURED,
        PERSONS_KILLED,
        SAFETY_USED,
    ];
}

/// Display format for crash timestamps in API payloads.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// English weekday names indexed by day code (0 = Monday).
pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Returns the weekday name for a numeric day code, or `Day_<n>` for codes
/// outside `0..=6`.
#[must_use]
pub fn day_name(code: i64) -> String {
    usize::try_from(code)
        .ok()
        .and_then(|i| DAY_NAMES.get(i))
        .map_or_else(|| format!("Day_{code}"), |name| (*name).to_string())
}

/// Meteorological season of a crash.
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
pub enum Season {
    /// December through February
    Winter,
    /// March through May
    Spring,
    /// June through August
    Summer,
    /// September through November
    Fall,
}

impl Season {
    /// Returns the season for a calendar month (1-12).
    #[must_use]
    pub const fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Fall,
            _ => Self::Winter,
        }
    }
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Returns `true` if the point lies inside the box, edges included.
    /// Non-finite coordinates are never inside.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude.is_finite()
            && longitude.is_finite()
            && (self.south..=self.north).contains(&latitude)
            && (self.west..=self.east).contains(&longitude)
    }
}

/// Bounds used to validate map coordinates (New York City).
pub const NYC_BOUNDS: BoundingBox = BoundingBox::new(-74.5, 40.4, -73.5, 40.9);

/// One person involved in one collision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionRecord {
    /// Identifier shared by every person-row of the same crash.
    pub collision_id: i64,
    /// When the crash happened, if the source value was parseable.
    pub crash_timestamp: Option<NaiveDateTime>,
    /// Calendar year of `crash_timestamp`.
    pub year: Option<i32>,
    /// Hour of day (0-23).
    pub hour_of_day: Option<u8>,
    /// Day of week (0 = Monday .. 6 = Sunday).
    pub day_of_week: Option<u8>,
    /// Season label.
    pub season: Option<String>,
    /// Borough name.
    pub borough: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Primary vehicle type.
    pub vehicle_type: Option<String>,
    /// Primary contributing factor.
    pub contributing_factor: Option<String>,
    /// Person identifier.
    pub person_id: Option<String>,
    /// Person type (Pedestrian, Cyclist, Occupant, ...).
    pub person_type: Option<String>,
    /// Injury status (Killed, Injured, Unspecified, ...).
    pub injury_status: Option<String>,
    /// Persons injured in the whole collision (repeated on every row).
    pub persons_injured_count: Option<i64>,
    /// Persons killed in the whole collision (repeated on every row).
    pub persons_killed_count: Option<i64>,
    /// Whether the person used safety equipment.
    pub safety_equipment_used: Option<bool>,
}

impl CollisionRecord {
    /// Fills the time-derived attributes from `crash_timestamp`.
    ///
    /// `year` always follows the timestamp. `hour_of_day`, `day_of_week`
    /// and `season` keep any value already read from the source and are
    /// derived only when absent.
    pub fn derive_time_attributes(&mut self) {
        self.year = self.crash_timestamp.map(|ts| ts.year());

        let Some(ts) = self.crash_timestamp else {
            return;
        };

        if self.hour_of_day.is_none() {
            self.hour_of_day = u8::try_from(ts.hour()).ok();
        }
        if self.day_of_week.is_none() {
            self.day_of_week = u8::try_from(ts.weekday().num_days_from_monday()).ok();
        }
        if self.season.is_none() {
            self.season = Some(Season::from_month(ts.month()).to_string());
        }
    }

    /// Returns `true` if both coordinates are present.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Calendar month label (`YYYY-MM`) of the crash timestamp.
    #[must_use]
    pub fn month_label(&self) -> Option<String> {
        self.crash_timestamp
            .map(|ts| ts.format("%Y-%m").to_string())
    }

    /// Crash timestamp rendered with [`TIMESTAMP_FORMAT`].
    #[must_use]
    pub fn timestamp_label(&self) -> Option<String> {
        self.crash_timestamp
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
    }
}

/// A dimension the aggregation engine can group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum GroupKey {
    /// Borough name.
    Borough,
    /// Primary vehicle type.
    VehicleType,
    /// Primary contributing factor.
    ContributingFactor,
    /// Person type.
    PersonType,
    /// Injury status.
    InjuryStatus,
    /// Season label.
    Season,
    /// Calendar year.
    Year,
    /// Hour of day.
    Hour,
    /// Calendar month (`YYYY-MM`).
    Month,
}

impl GroupKey {
    /// Extracts this dimension's value from a record. `None` means the
    /// record does not contribute to any group.
    #[must_use]
    pub fn extract(self, record: &CollisionRecord) -> Option<GroupValue> {
        match self {
            Self::Borough => record.borough.clone().map(GroupValue::Text),
            Self::VehicleType => record.vehicle_type.clone().map(GroupValue::Text),
            Self::ContributingFactor => record.contributing_factor.clone().map(GroupValue::Text),
            Self::PersonType => record.person_type.clone().map(GroupValue::Text),
            Self::InjuryStatus => record.injury_status.clone().map(GroupValue::Text),
            Self::Season => record.season.clone().map(GroupValue::Text),
            Self::Year => record.year.map(|y| GroupValue::Int(i64::from(y))),
            Self::Hour => record.hour_of_day.map(|h| GroupValue::Int(i64::from(h))),
            Self::Month => record.month_label().map(GroupValue::Text),
        }
    }
}

/// The value of one group produced by a [`GroupKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    /// Integer-valued dimension (year, hour).
    Int(i64),
    /// Text-valued dimension.
    Text(String),
}

impl std::fmt::Display for GroupValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 15, 0)
            .unwrap()
    }

    #[test]
    fn day_names_fall_back_for_unknown_codes() {
        assert_eq!(day_name(0), "Monday");
        assert_eq!(day_name(6), "Sunday");
        assert_eq!(day_name(7), "Day_7");
        assert_eq!(day_name(-1), "Day_-1");
    }

    #[test]
    fn seasons_follow_meteorological_months() {
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(2), Season::Winter);
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(7), Season::Summer);
        assert_eq!(Season::from_month(10), Season::Fall);
        assert_eq!(Season::Fall.to_string(), "Fall");
    }

    #[test]
    fn nyc_bounds_include_edges_and_reject_outside() {
        assert!(NYC_BOUNDS.contains(40.4, -74.5));
        assert!(NYC_BOUNDS.contains(40.9, -73.5));
        assert!(NYC_BOUNDS.contains(40.7, -73.9));
        assert!(!NYC_BOUNDS.contains(41.5, -73.9));
        assert!(!NYC_BOUNDS.contains(40.7, -73.4));
        assert!(!NYC_BOUNDS.contains(f64::NAN, -73.9));
    }

    #[test]
    fn derives_time_attributes_from_timestamp() {
        // 2022-03-14 was a Monday.
        let mut record = CollisionRecord {
            collision_id: 1,
            crash_timestamp: Some(ts(2022, 3, 14, 17)),
            ..CollisionRecord::default()
        };
        record.derive_time_attributes();

        assert_eq!(record.year, Some(2022));
        assert_eq!(record.hour_of_day, Some(17));
        assert_eq!(record.day_of_week, Some(0));
        assert_eq!(record.season.as_deref(), Some("Spring"));
        assert_eq!(record.month_label().as_deref(), Some("2022-03"));
        assert_eq!(
            record.timestamp_label().as_deref(),
            Some("2022-03-14 17:15:00")
        );
    }

    #[test]
    fn keeps_source_attributes_when_present() {
        let mut record = CollisionRecord {
            collision_id: 1,
            crash_timestamp: Some(ts(2022, 3, 14, 17)),
            hour_of_day: Some(3),
            season: Some("Rainy".to_string()),
            year: Some(1999),
            ..CollisionRecord::default()
        };
        record.derive_time_attributes();

        assert_eq!(record.year, Some(2022));
        assert_eq!(record.hour_of_day, Some(3));
        assert_eq!(record.season.as_deref(), Some("Rainy"));
    }

    #[test]
    fn missing_timestamp_clears_year() {
        let mut record = CollisionRecord {
            collision_id: 1,
            year: Some(2020),
            ..CollisionRecord::default()
        };
        record.derive_time_attributes();
        assert_eq!(record.year, None);
        assert_eq!(record.hour_of_day, None);
    }

    #[test]
    fn group_key_extracts_values() {
        let record = CollisionRecord {
            collision_id: 1,
            borough: Some("QUEENS".to_string()),
            hour_of_day: Some(8),
            ..CollisionRecord::default()
        };
        assert_eq!(
            GroupKey::Borough.extract(&record),
            Some(GroupValue::Text("QUEENS".to_string()))
        );
        assert_eq!(GroupKey::Hour.extract(&record), Some(GroupValue::Int(8)));
        assert_eq!(GroupKey::Month.extract(&record), None);
        assert_eq!(GroupValue::Int(8).to_string(), "8");
    }
}
