//! Aggregate statistics for a filter.

use crash_map_analytics_models::{
    Breakdown, DayHourMatrix, DayHours, GroupCount, StatsBundle, TOP_BREAKDOWN_LIMIT,
};
use crash_map_collision_models::{CollisionFilter, FilterSpec, GroupKey, GroupValue, day_name};
use crash_map_dataset::{CollisionStore, DayHourCount, Grouping};

use crate::{AnalyticsError, StepExt as _, geo};

/// Computes the statistics bundle for a wire-form filter.
///
/// # Errors
///
/// * If the filter specification is invalid
/// * If any aggregation step fails
pub fn compute_stats(
    store: &dyn CollisionStore,
    spec: &FilterSpec,
) -> Result<StatsBundle, AnalyticsError> {
    let filter = spec.parse()?;
    compute_filtered(store, &filter)
}

/// Computes the statistics bundle for a parsed filter.
///
/// # Errors
///
/// * If any aggregation step fails
pub fn compute_filtered(
    store: &dyn CollisionStore,
    filter: &CollisionFilter,
) -> Result<StatsBundle, AnalyticsError> {
    let totals = store.totals(filter).step("totals")?;
    log::debug!(
        "Filter {filter:?} matched {} rows, {} collisions",
        totals.persons,
        totals.crashes
    );

    let breakdown = |grouping: Grouping, step: &'static str| {
        store
            .group_counts(filter, &grouping)
            .step(step)
            .map(Breakdown::from)
    };

    Ok(StatsBundle {
        total_crashes: totals.crashes,
        total_persons: totals.persons,
        total_injuries: totals.injuries,
        total_deaths: totals.deaths,
        by_borough: breakdown(Grouping::collisions_by_key(GroupKey::Borough), "by_borough")?,
        by_vehicle: breakdown(
            Grouping::rows_desc(GroupKey::VehicleType).top(TOP_BREAKDOWN_LIMIT),
            "by_vehicle",
        )?,
        by_factor: breakdown(
            Grouping::rows_desc(GroupKey::ContributingFactor).top(TOP_BREAKDOWN_LIMIT),
            "by_factor",
        )?,
        by_person_type: breakdown(Grouping::rows_desc(GroupKey::PersonType), "by_person_type")?,
        by_injury: breakdown(Grouping::rows_desc(GroupKey::InjuryStatus), "by_injury")?,
        by_month: breakdown(Grouping::collisions_by_key(GroupKey::Month), "by_month")?,
        by_hour: breakdown(Grouping::collisions_by_key(GroupKey::Hour), "by_hour")?,
        by_day_hour: day_hour_matrix(store.day_hour_counts(filter).step("by_day_hour")?),
        by_season: breakdown(Grouping::rows_desc(GroupKey::Season), "by_season")?,
        safety_stats: store.safety_counts(filter).step("safety_stats")?,
        geo_data: geo::sample_geo(store, filter)?,
    })
}

/// Nests (day, hour) cells ordered by day then hour into one entry per day.
fn day_hour_matrix(cells: Vec<DayHourCount>) -> DayHourMatrix {
    let mut days: Vec<(i64, Vec<GroupCount>)> = Vec::new();

    for cell in cells {
        let hour = GroupCount::new(GroupValue::Int(cell.hour), cell.count);
        match days.last_mut() {
            Some((day, hours)) if *day == cell.day => hours.push(hour),
            _ => days.push((cell.day, vec![hour])),
        }
    }

    DayHourMatrix(
        days.into_iter()
            .map(|(day, hours)| DayHours {
                day: day_name(day),
                hours: Breakdown(hours),
            })
            .collect(),
    )
}
