#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Collision statistics engine.
//!
//! Composes the aggregate primitives of a [`CollisionStore`] into the
//! [`StatsBundle`] served by `/api/stats`, samples map points for the same
//! filter, and lists the values available for each filter dimension. The
//! engine is written once against the store trait and never knows which
//! backend is active.
//!
//! [`CollisionStore`]: crash_map_dataset::CollisionStore
//! [`StatsBundle`]: crash_map_analytics_models::StatsBundle

pub mod catalog;
pub mod geo;
pub mod stats;

use crash_map_collision_models::InvalidFilterError;
use crash_map_dataset::{LoadError, StoreError};
use thiserror::Error;

pub use catalog::list_filter_options;
pub use geo::{GeoValidationError, sample_geo};
pub use stats::{compute_filtered, compute_stats};

/// Errors that can occur while computing statistics.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The filter specification could not be interpreted.
    #[error(transparent)]
    InvalidFilter(#[from] InvalidFilterError),

    /// The dataset could not be loaded.
    #[error("Dataset unavailable: {0}")]
    Load(#[from] LoadError),

    /// One aggregation step failed. No partial result is produced.
    #[error("Failed to compute {step}: {source}")]
    Aggregation {
        /// Name of the failed step.
        step: &'static str,
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

/// Tags a store failure with the aggregation step it happened in.
trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, AnalyticsError>;
}

impl<T> StepExt<T> for Result<T, StoreError> {
    fn step(self, step: &'static str) -> Result<T, AnalyticsError> {
        self.map_err(|source| {
            log::error!("Aggregation step {step} failed: {source}");
            AnalyticsError::Aggregation { step, source }
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, NaiveDateTime};
    use crash_map_collision_models::CollisionRecord;

    pub fn ts(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    pub fn person(
        collision_id: i64,
        person_id: &str,
        borough: &str,
        timestamp: NaiveDateTime,
    ) -> CollisionRecord {
        let mut record = CollisionRecord {
            collision_id,
            crash_timestamp: Some(timestamp),
            borough: Some(borough.to_string()),
            person_id: Some(person_id.to_string()),
            latitude: Some(40.65),
            longitude: Some(-73.95),
            ..CollisionRecord::default()
        };
        record.derive_time_attributes();
        record
    }

    /// Collision A: two person-rows in BROOKLYN, 2022. Collision B: one
    /// person-row in QUEENS, 2021.
    pub fn two_collisions() -> Vec<CollisionRecord> {
        vec![
            person(100, "a1", "BROOKLYN", ts(2022, 5, 2, 8)),
            person(100, "a2", "BROOKLYN", ts(2022, 5, 2, 8)),
            person(200, "b1", "QUEENS", ts(2021, 11, 20, 17)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use crash_map_collision_models::FilterSpec;
    use crash_map_dataset::MemoryStore;

    use super::*;

    #[test]
    fn invalid_year_is_reported_as_invalid_filter() {
        let store = MemoryStore::from_records(fixtures::two_collisions());
        let spec = FilterSpec {
            year: Some("20x2".to_string()),
            ..FilterSpec::default()
        };

        let err = compute_stats(&store, &spec).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidFilter(_)));
        assert!(err.to_string().contains("20x2"));
    }

    #[test]
    fn store_failures_name_the_step() {
        let err = Err::<(), _>(StoreError::Conversion {
            message: "bad".to_string(),
        })
        .step("by_hour")
        .unwrap_err();

        assert!(matches!(
            err,
            AnalyticsError::Aggregation {
                step: "by_hour",
                ..
            }
        ));
        assert_eq!(err.to_string(), "Failed to compute by_hour: Conversion error: bad");
    }
}
