#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregate statistics bundle and filter catalog types.
//!
//! These are the shapes returned by the aggregation engine and serialized
//! to the front end. Grouped breakdowns serialize as JSON objects whose key
//! order is the order of the underlying list, so top-N rankings survive
//! the trip to the client.

use crash_map_collision_models::GroupValue;
use serde::ser::{SerializeMap as _, Serializer};
use serde::{Deserialize, Serialize};

/// Number of entries kept in the vehicle and factor rankings.
pub const TOP_BREAKDOWN_LIMIT: usize = 10;

/// Number of entries offered for vehicle and factor filter options.
pub const TOP_CATALOG_LIMIT: usize = 15;

/// Maximum number of points in the geographic sample.
pub const GEO_SAMPLE_LIMIT: usize = 500;

/// Count for a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    /// Group value.
    pub key: GroupValue,
    /// Row count or distinct-collision count, depending on the breakdown.
    pub count: u64,
}

impl GroupCount {
    /// Creates a new group count.
    #[must_use]
    pub const fn new(key: GroupValue, count: u64) -> Self {
        Self { key, count }
    }
}

/// An ordered list of group counts, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown(pub Vec<GroupCount>);

impl Breakdown {
    /// Returns the count for the group whose rendered key equals `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.0
            .iter()
            .find(|g| g.key.to_string() == key)
            .map(|g| g.count)
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the groups in order.
    pub fn iter(&self) -> std::slice::Iter<'_, GroupCount> {
        self.0.iter()
    }

    /// Rendered group keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.iter().map(|g| g.key.to_string()).collect()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().map(|g| g.count).sum()
    }
}

impl From<Vec<GroupCount>> for Breakdown {
    fn from(groups: Vec<GroupCount>) -> Self {
        Self(groups)
    }
}

impl Serialize for Breakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for group in &self.0 {
            map.serialize_entry(&group.key.to_string(), &group.count)?;
        }
        map.end()
    }
}

/// Crash counts for one weekday, keyed by hour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayHours {
    /// Weekday name (`Monday`..`Sunday`, or `Day_<n>`).
    pub day: String,
    /// Distinct-collision counts per hour of day.
    pub hours: Breakdown,
}

/// Day-of-week x hour-of-day heatmap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayHourMatrix(pub Vec<DayHours>);

impl DayHourMatrix {
    /// Returns the count for a weekday name and hour.
    #[must_use]
    pub fn get(&self, day: &str, hour: u8) -> Option<u64> {
        self.0
            .iter()
            .find(|d| d.day == day)
            .and_then(|d| d.hours.get(&hour.to_string()))
    }

    /// Weekday names present, in order.
    #[must_use]
    pub fn days(&self) -> Vec<&str> {
        self.0.iter().map(|d| d.day.as_str()).collect()
    }
}

impl Serialize for DayHourMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for day in &self.0 {
            map.serialize_entry(&day.day, &day.hours)?;
        }
        map.end()
    }
}

/// Distinct persons with and without safety equipment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyStats {
    /// Distinct persons whose safety flag is set.
    pub used: u64,
    /// Distinct persons whose safety flag is explicitly unset.
    pub not_used: u64,
}

/// A validated point for map rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GeoPoint {
    /// Latitude inside the NYC bounds.
    pub latitude: f64,
    /// Longitude inside the NYC bounds.
    pub longitude: f64,
    /// Borough name, `"Unknown"` when absent.
    pub borough: String,
    /// Primary vehicle type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    /// Injury status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injury_type: Option<String>,
    /// Hour of day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    /// Crash timestamp as `YYYY-MM-DD HH:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_date: Option<String>,
}

/// The full set of aggregates returned by one stats request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsBundle {
    /// Distinct collisions.
    pub total_crashes: u64,
    /// Person-rows.
    pub total_persons: u64,
    /// Sum of collision-level injured counters over person-rows.
    pub total_injuries: i64,
    /// Sum of collision-level killed counters over person-rows.
    pub total_deaths: i64,
    /// Distinct collisions per borough.
    pub by_borough: Breakdown,
    /// Top vehicle types by person-rows.
    pub by_vehicle: Breakdown,
    /// Top contributing factors by person-rows.
    pub by_factor: Breakdown,
    /// Person-rows per person type.
    pub by_person_type: Breakdown,
    /// Person-rows per injury status.
    pub by_injury: Breakdown,
    /// Distinct collisions per `YYYY-MM`.
    pub by_month: Breakdown,
    /// Distinct collisions per hour of day.
    pub by_hour: Breakdown,
    /// Distinct collisions per weekday and hour.
    pub by_day_hour: DayHourMatrix,
    /// Person-rows per season.
    pub by_season: Breakdown,
    /// Safety equipment usage.
    pub safety_stats: SafetyStats,
    /// Bounded geographic sample.
    pub geo_data: Vec<GeoPoint>,
}

/// Available values for each filterable dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCatalog {
    /// `"All"` followed by every borough, sorted.
    pub boroughs: Vec<String>,
    /// `"All"` followed by every year, ascending.
    pub years: Vec<String>,
    /// `"All"` followed by the most frequent vehicle types.
    pub vehicle_types: Vec<String>,
    /// `"All"` followed by the most frequent contributing factors.
    pub contributing_factors: Vec<String>,
    /// `"All"` followed by every person type.
    pub person_types: Vec<String>,
    /// `"All"` followed by every injury status.
    pub injury_types: Vec<String>,
}
