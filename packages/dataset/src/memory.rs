//! In-memory collision table.

use std::collections::{BTreeMap, HashMap, HashSet};

use crash_map_analytics_models::{GroupCount, SafetyStats};
use crash_map_collision_models::{
    BoundingBox, CollisionFilter, CollisionRecord, GroupValue, columns,
};

use crate::{
    Backend, CollisionStore, DayHourCount, GroupOrder, Grouping, Measure, StoreError, Totals,
};

/// A fully materialized table of collision records, evaluated by scanning.
pub struct MemoryStore {
    records: Vec<CollisionRecord>,
    columns: Vec<String>,
}

impl MemoryStore {
    /// Creates a store over `records` read from a source with the given
    /// column names.
    #[must_use]
    pub const fn new(records: Vec<CollisionRecord>, columns: Vec<String>) -> Self {
        Self { records, columns }
    }

    /// Creates a store whose columns are the canonical schema.
    #[must_use]
    pub fn from_records(records: Vec<CollisionRecord>) -> Self {
        Self::new(
            records,
            columns::ALL.iter().map(ToString::to_string).collect(),
        )
    }

    /// All records in dataset order.
    #[must_use]
    pub fn records(&self) -> &[CollisionRecord] {
        &self.records
    }

    fn filtered<'a>(
        &'a self,
        filter: &'a CollisionFilter,
    ) -> impl Iterator<Item = &'a CollisionRecord> + 'a {
        self.records.iter().filter(move |r| filter.matches(r))
    }
}

/// Rows and distinct collisions seen for one group.
struct GroupTally {
    key: GroupValue,
    rows: u64,
    collisions: HashSet<i64>,
}

impl CollisionStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Csv
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn record_count(&self) -> Result<u64, StoreError> {
        Ok(self.records.len() as u64)
    }

    fn geo_record_count(&self) -> Result<u64, StoreError> {
        Ok(self.records.iter().filter(|r| r.has_coordinates()).count() as u64)
    }

    fn totals(&self, filter: &CollisionFilter) -> Result<Totals, StoreError> {
        let mut crashes = HashSet::new();
        let mut totals = Totals::default();

        for record in self.filtered(filter) {
            crashes.insert(record.collision_id);
            totals.persons += 1;
            totals.injuries += record.persons_injured_count.unwrap_or(0);
            totals.deaths += record.persons_killed_count.unwrap_or(0);
        }

        totals.crashes = crashes.len() as u64;
        Ok(totals)
    }

    fn group_counts(
        &self,
        filter: &CollisionFilter,
        grouping: &Grouping,
    ) -> Result<Vec<GroupCount>, StoreError> {
        let mut tallies: Vec<GroupTally> = Vec::new();
        let mut index: HashMap<GroupValue, usize> = HashMap::new();

        for record in self.filtered(filter) {
            let Some(key) = grouping.key.extract(record) else {
                continue;
            };
            let slot = if let Some(&slot) = index.get(&key) {
                slot
            } else {
                tallies.push(GroupTally {
                    key: key.clone(),
                    rows: 0,
                    collisions: HashSet::new(),
                });
                index.insert(key, tallies.len() - 1);
                tallies.len() - 1
            };

            let tally = &mut tallies[slot];
            tally.rows += 1;
            if grouping.measure == Measure::DistinctCollisions {
                tally.collisions.insert(record.collision_id);
            }
        }

        let mut groups: Vec<GroupCount> = tallies
            .into_iter()
            .map(|t| {
                let count = match grouping.measure {
                    Measure::Rows => t.rows,
                    Measure::DistinctCollisions => t.collisions.len() as u64,
                };
                GroupCount::new(t.key, count)
            })
            .collect();

        // Stable sort keeps first-appearance order among equal counts.
        match grouping.order {
            GroupOrder::CountDesc => groups.sort_by(|a, b| b.count.cmp(&a.count)),
            GroupOrder::KeyAsc => groups.sort_by(|a, b| a.key.cmp(&b.key)),
            GroupOrder::FirstSeen => {}
        }

        if let Some(limit) = grouping.limit {
            groups.truncate(limit);
        }

        Ok(groups)
    }

    fn day_hour_counts(&self, filter: &CollisionFilter) -> Result<Vec<DayHourCount>, StoreError> {
        let mut cells: BTreeMap<(i64, i64), HashSet<i64>> = BTreeMap::new();

        for record in self.filtered(filter) {
            if let (Some(day), Some(hour)) = (record.day_of_week, record.hour_of_day) {
                cells
                    .entry((i64::from(day), i64::from(hour)))
                    .or_default()
                    .insert(record.collision_id);
            }
        }

        Ok(cells
            .into_iter()
            .map(|((day, hour), ids)| DayHourCount {
                day,
                hour,
                count: ids.len() as u64,
            })
            .collect())
    }

    fn safety_counts(&self, filter: &CollisionFilter) -> Result<SafetyStats, StoreError> {
        let mut used = HashSet::new();
        let mut not_used = HashSet::new();

        for record in self.filtered(filter) {
            let (Some(person), Some(flag)) =
                (record.person_id.as_deref(), record.safety_equipment_used)
            else {
                continue;
            };
            if flag {
                used.insert(person);
            } else {
                not_used.insert(person);
            }
        }

        Ok(SafetyStats {
            used: used.len() as u64,
            not_used: not_used.len() as u64,
        })
    }

    fn geo_candidates(
        &self,
        filter: &CollisionFilter,
        bounds: &BoundingBox,
        limit: usize,
    ) -> Result<Vec<CollisionRecord>, StoreError> {
        Ok(self
            .filtered(filter)
            .filter(|r| match (r.latitude, r.longitude) {
                (Some(lat), Some(lon)) => bounds.contains(lat, lon),
                _ => false,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn head(&self, limit: usize) -> Result<Vec<CollisionRecord>, StoreError> {
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}
