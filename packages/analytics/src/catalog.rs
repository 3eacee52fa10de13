//! Filter option catalog.

use crash_map_analytics_models::{FilterCatalog, TOP_CATALOG_LIMIT};
use crash_map_collision_models::filter::ALL;
use crash_map_collision_models::{CollisionFilter, GroupKey};
use crash_map_dataset::{CollisionStore, GroupOrder, Grouping, Measure};

use crate::{AnalyticsError, StepExt as _};

/// Lists the values available for each filter dimension over the whole
/// dataset. Every list starts with `"All"`.
///
/// # Errors
///
/// * If any listing query fails
pub fn list_filter_options(store: &dyn CollisionStore) -> Result<FilterCatalog, AnalyticsError> {
    let ordered = |key, order| Grouping {
        key,
        measure: Measure::Rows,
        order,
        limit: None,
    };
    let sorted = |key| ordered(key, GroupOrder::KeyAsc);
    let first_seen = |key| ordered(key, GroupOrder::FirstSeen);

    Ok(FilterCatalog {
        boroughs: options(store, sorted(GroupKey::Borough), "boroughs")?,
        years: options(store, sorted(GroupKey::Year), "years")?,
        vehicle_types: options(
            store,
            Grouping::rows_desc(GroupKey::VehicleType).top(TOP_CATALOG_LIMIT),
            "vehicle_types",
        )?,
        contributing_factors: options(
            store,
            Grouping::rows_desc(GroupKey::ContributingFactor).top(TOP_CATALOG_LIMIT),
            "contributing_factors",
        )?,
        person_types: options(store, first_seen(GroupKey::PersonType), "person_types")?,
        injury_types: options(store, first_seen(GroupKey::InjuryStatus), "injury_types")?,
    })
}

fn options(
    store: &dyn CollisionStore,
    grouping: Grouping,
    step: &'static str,
) -> Result<Vec<String>, AnalyticsError> {
    let groups = store
        .group_counts(&CollisionFilter::default(), &grouping)
        .step(step)?;

    Ok(std::iter::once(ALL.to_string())
        .chain(groups.iter().map(|g| g.key.to_string()))
        .collect())
}
