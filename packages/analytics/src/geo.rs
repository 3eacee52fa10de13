//! Map point sampling.
//!
//! The store pre-filters candidates to the NYC bounding box and caps them
//! at [`GEO_SAMPLE_LIMIT`] in dataset order. Each candidate is then checked
//! again before it becomes a [`GeoPoint`]; failures are logged and dropped.

use crash_map_analytics_models::{GEO_SAMPLE_LIMIT, GeoPoint};
use crash_map_collision_models::{BoundingBox, CollisionFilter, CollisionRecord, NYC_BOUNDS};
use crash_map_dataset::CollisionStore;
use thiserror::Error;

use crate::{AnalyticsError, StepExt as _};

/// Borough reported for points without one.
pub const UNKNOWN_BOROUGH: &str = "Unknown";

/// Why a record cannot be placed on the map.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoValidationError {
    /// One or both coordinates are absent.
    #[error("collision {collision_id} has no coordinates")]
    MissingCoordinates {
        /// Offending collision.
        collision_id: i64,
    },

    /// A coordinate is NaN or infinite.
    #[error("collision {collision_id} has non-finite coordinates ({latitude}, {longitude})")]
    NonFinite {
        /// Offending collision.
        collision_id: i64,
        /// Latitude as stored.
        latitude: f64,
        /// Longitude as stored.
        longitude: f64,
    },

    /// The point lies outside the map bounds.
    #[error("collision {collision_id} lies outside the map bounds ({latitude}, {longitude})")]
    OutOfBounds {
        /// Offending collision.
        collision_id: i64,
        /// Latitude as stored.
        latitude: f64,
        /// Longitude as stored.
        longitude: f64,
    },
}

/// Converts a record into a map point if its coordinates are valid.
///
/// # Errors
///
/// * If a coordinate is missing, non-finite, or outside `bounds`
pub fn to_geo_point(
    record: &CollisionRecord,
    bounds: &BoundingBox,
) -> Result<GeoPoint, GeoValidationError> {
    let collision_id = record.collision_id;
    let (Some(latitude), Some(longitude)) = (record.latitude, record.longitude) else {
        return Err(GeoValidationError::MissingCoordinates { collision_id });
    };

    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(GeoValidationError::NonFinite {
            collision_id,
            latitude,
            longitude,
        });
    }
    if !bounds.contains(latitude, longitude) {
        return Err(GeoValidationError::OutOfBounds {
            collision_id,
            latitude,
            longitude,
        });
    }

    Ok(GeoPoint {
        latitude,
        longitude,
        borough: record
            .borough
            .clone()
            .unwrap_or_else(|| UNKNOWN_BOROUGH.to_string()),
        vehicle_type: record.vehicle_type.clone(),
        injury_type: record.injury_status.clone(),
        hour: record.hour_of_day,
        crash_date: record.timestamp_label(),
    })
}

/// Returns up to [`GEO_SAMPLE_LIMIT`] validated points matching `filter`.
///
/// # Errors
///
/// * If the store fails to produce candidates
pub fn sample_geo(
    store: &dyn CollisionStore,
    filter: &CollisionFilter,
) -> Result<Vec<GeoPoint>, AnalyticsError> {
    let candidates = store
        .geo_candidates(filter, &NYC_BOUNDS, GEO_SAMPLE_LIMIT)
        .step("geo_data")?;

    Ok(candidates
        .iter()
        .filter_map(|record| {
            to_geo_point(record, &NYC_BOUNDS)
                .inspect_err(|e| log::debug!("Dropping map point: {e}"))
                .ok()
        })
        .collect())
}
