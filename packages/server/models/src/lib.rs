#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the crash map server.

use crash_map_collision_models::{CollisionRecord, FilterSpec, columns};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of records returned by `GET /api/data`.
pub const DATA_PREVIEW_LIMIT: usize = 100;

/// Placeholder for absent values in raw record previews.
pub const NOT_AVAILABLE: &str = "N/A";

/// Overall service state reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The dataset is loaded, or there was nothing to load.
    Healthy,
    /// Loading the dataset failed.
    Unhealthy,
}

/// Presence of the columns the map and breakdowns rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RequiredColumns {
    /// `LATITUDE` is present.
    pub latitude: bool,
    /// `LONGITUDE` is present.
    pub longitude: bool,
    /// `BOROUGH` is present.
    pub borough: bool,
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Always [`HealthStatus::Healthy`].
    pub status: HealthStatus,
    /// Whether the dataset has been loaded.
    pub data_loaded: bool,
    /// Configured backend (`csv` or `duckdb`).
    pub backend: String,
    /// Server package version.
    pub version: String,
    /// Whether the flat file exists; only reported by the CSV backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_file_exists: Option<bool>,
    /// Number of person rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<u64>,
    /// Number of source columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    /// Whether any row has both coordinates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_geo_data: Option<bool>,
    /// Rows with both coordinates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_data_count: Option<u64>,
    /// Which map and breakdown columns exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_columns: Option<RequiredColumns>,
}

/// Health check response when the dataset failed to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUnhealthy {
    /// Always [`HealthStatus::Unhealthy`].
    pub status: HealthStatus,
    /// Why the dataset could not be loaded.
    pub error: String,
    /// Whether the flat file exists; only reported by the CSV backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_file_exists: Option<bool>,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable message.
    pub error: String,
}

/// `POST /api/search` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query; missing means empty.
    #[serde(default)]
    pub query: String,
}

/// `POST /api/search` response body. Only recognized keys are present in
/// `filters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Extracted filter constraints.
    pub filters: FilterSpec,
}

/// A raw record keyed by source column name, with absent values rendered
/// as [`NOT_AVAILABLE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiRecord(pub serde_json::Map<String, Value>);

impl From<&CollisionRecord> for ApiRecord {
    fn from(record: &CollisionRecord) -> Self {
        let values = [
            Value::from(record.collision_id),
            Value::from(record.timestamp_label()),
            Value::from(record.year),
            Value::from(record.hour_of_day),
            Value::from(record.day_of_week),
            Value::from(record.season.clone()),
            Value::from(record.borough.clone()),
            Value::from(record.latitude),
            Value::from(record.longitude),
            Value::from(record.vehicle_type.clone()),
            Value::from(record.contributing_factor.clone()),
            Value::from(record.person_id.clone()),
            Value::from(record.person_type.clone()),
            Value::from(record.injury_status.clone()),
            Value::from(record.persons_injured_count),
            Value::from(record.persons_killed_count),
            Value::from(record.safety_equipment_used.map(u8::from)),
        ];

        Self(
            columns::ALL
                .iter()
                .zip(values)
                .map(|(name, value)| {
                    let value = if value.is_null() {
                        Value::from(NOT_AVAILABLE)
                    } else {
                        value
                    };
                    ((*name).to_string(), value)
                })
                .collect(),
        )
    }
}

/// `GET /api/data` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    /// The first [`DATA_PREVIEW_LIMIT`] records in dataset order.
    pub data: Vec<ApiRecord>,
    /// Total number of rows in the dataset.
    pub total: u64,
}
