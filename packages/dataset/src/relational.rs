//! `DuckDB`-backed collision table.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use crash_map_analytics_models::{GroupCount, SafetyStats};
use crash_map_collision_models::{
    BoundingBox, CollisionFilter, CollisionRecord, GroupKey, GroupValue, TIMESTAMP_FORMAT,
    columns,
};
use duckdb::types::Value;

use crate::parsing::find_date_column;
use crate::pool::DuckDbPool;
use crate::sql::{WhereClause, quote_ident, validate_table_name};
use crate::{
    Backend, CollisionStore, DatasetProvider, DayHourCount, GroupOrder, Grouping, LoadError,
    Measure, StoreError, Totals,
};

/// Where and how to open the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuckDbConfig {
    /// Database file.
    pub path: PathBuf,
    /// Table holding one row per person per collision.
    pub table: String,
    /// Number of pooled read-only connections.
    pub pool_size: usize,
    /// Connections older than this are reopened on acquire.
    pub max_connection_age: Duration,
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/crashes.duckdb"),
            table: "crashes".to_string(),
            pool_size: 4,
            max_connection_age: Duration::from_secs(1800),
        }
    }
}

/// Whether a group expression yields integers or text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Int,
    Text,
}

/// A collision table queried through parameterized SQL.
pub struct DuckDbStore {
    pool: DuckDbPool,
    table: String,
    columns: Vec<String>,
    timestamp_expr: String,
    year_expr: String,
    record_select: String,
}

impl DuckDbStore {
    /// Opens the pool and checks that the table has the expected columns.
    ///
    /// # Errors
    ///
    /// * If the table name is not a plain identifier
    /// * If the database file does not exist or cannot be opened
    /// * If the table is missing or lacks required columns
    pub fn open(config: &DuckDbConfig) -> Result<Self, LoadError> {
        let table = validate_table_name(&config.table)?;
        if !config.path.exists() {
            return Err(LoadError::SourceNotFound {
                path: config.path.clone(),
            });
        }

        let pool = DuckDbPool::open(
            &config.path,
            config.pool_size,
            config.max_connection_age,
        )?;
        let columns = table_columns(&pool, &config.table)?;
        if columns.is_empty() {
            return Err(LoadError::MissingTable {
                table: config.table.clone(),
            });
        }

        let date_column = find_date_column(&columns)
            .map(|i| columns[i].clone())
            .ok_or_else(|| LoadError::MissingDateColumn {
                columns: columns.clone(),
            })?;

        let missing: Vec<String> = columns::ALL
            .iter()
            .filter(|c| **c != columns::YEAR && **c != columns::CRASH_DATE)
            .filter(|c| !columns.iter().any(|existing| existing == *c))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                table: config.table.clone(),
                missing,
            });
        }

        let timestamp_expr = format!("CAST({} AS TIMESTAMP)", quote_ident(&date_column));
        let year_expr = if columns.iter().any(|c| c == columns::YEAR) {
            cast(columns::YEAR, "BIGINT")
        } else {
            format!("CAST(year({timestamp_expr}) AS BIGINT)")
        };
        let record_select = record_select(&timestamp_expr, &year_expr);

        log::info!(
            "Opened DuckDB table {table} at {} ({} pooled connections)",
            config.path.display(),
            pool.size()
        );

        Ok(Self {
            pool,
            table,
            columns,
            timestamp_expr,
            year_expr,
            record_select,
        })
    }

    fn filter_clause(&self, filter: &CollisionFilter) -> WhereClause {
        WhereClause::for_filter(filter, &self.year_expr)
    }

    fn key_expr(&self, key: GroupKey) -> (String, KeyKind) {
        match key {
            GroupKey::Borough => (quote_ident(columns::BOROUGH), KeyKind::Text),
            GroupKey::VehicleType => (quote_ident(columns::VEHICLE_TYPE), KeyKind::Text),
            GroupKey::ContributingFactor => {
                (quote_ident(columns::CONTRIBUTING_FACTOR), KeyKind::Text)
            }
            GroupKey::PersonType => (quote_ident(columns::PERSON_TYPE), KeyKind::Text),
            GroupKey::InjuryStatus => (quote_ident(columns::PERSON_INJURY), KeyKind::Text),
            GroupKey::Season => (quote_ident(columns::SEASON), KeyKind::Text),
            GroupKey::Year => (self.year_expr.clone(), KeyKind::Int),
            GroupKey::Hour => (cast(columns::HOUR, "BIGINT"), KeyKind::Int),
            GroupKey::Month => (
                format!("strftime({}, '%Y-%m')", self.timestamp_expr),
                KeyKind::Text,
            ),
        }
    }

    fn query<T, F>(&self, sql: &str, params: &[Value], map: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
    {
        log::trace!("{sql}");
        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(duckdb::params_from_iter(params), map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_one<T, F>(&self, sql: &str, params: &[Value], map: F) -> Result<T, StoreError>
    where
        F: FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
    {
        self.query(sql, params, map)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Conversion {
                message: format!("query returned no rows: {sql}"),
            })
    }

    fn records(&self, clause: &WhereClause, limit: usize) -> Result<Vec<CollisionRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY rowid LIMIT {limit}",
            self.record_select,
            self.table,
            clause.sql()
        );
        self.query(&sql, clause.params(), read_record)
    }
}

impl CollisionStore for DuckDbStore {
    fn backend(&self) -> Backend {
        Backend::DuckDb
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn record_count(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        self.query_one(&sql, &[], |row| row.get::<_, i64>(0))
            .map(to_count)
    }

    fn geo_record_count(&self) -> Result<u64, StoreError> {
        let clause = WhereClause::new()
            .not_null(&quote_ident(columns::LATITUDE))
            .not_null(&quote_ident(columns::LONGITUDE));
        let sql = format!("SELECT COUNT(*) FROM {}{}", self.table, clause.sql());
        self.query_one(&sql, clause.params(), |row| row.get::<_, i64>(0))
            .map(to_count)
    }

    fn totals(&self, filter: &CollisionFilter) -> Result<Totals, StoreError> {
        let clause = self.filter_clause(filter);
        let sql = format!(
            "SELECT COUNT(DISTINCT {id}), COUNT(*), \
             CAST(COALESCE(SUM({injured}), 0) AS BIGINT), \
             CAST(COALESCE(SUM({killed}), 0) AS BIGINT) \
             FROM {table}{where_sql}",
            id = quote_ident(columns::COLLISION_ID),
            injured = cast(columns::PERSONS_INJURED, "BIGINT"),
            killed = cast(columns::PERSONS_KILLED, "BIGINT"),
            table = self.table,
            where_sql = clause.sql(),
        );

        self.query_one(&sql, clause.params(), |row| {
            Ok(Totals {
                crashes: to_count(row.get(0)?),
                persons: to_count(row.get(1)?),
                injuries: row.get(2)?,
                deaths: row.get(3)?,
            })
        })
    }

    fn group_counts(
        &self,
        filter: &CollisionFilter,
        grouping: &Grouping,
    ) -> Result<Vec<GroupCount>, StoreError> {
        let (expr, kind) = self.key_expr(grouping.key);
        let clause = self.filter_clause(filter).not_null(&expr);

        let measure = match grouping.measure {
            Measure::Rows => "COUNT(*)".to_string(),
            Measure::DistinctCollisions => {
                format!("COUNT(DISTINCT {})", quote_ident(columns::COLLISION_ID))
            }
        };
        let order = match grouping.order {
            GroupOrder::CountDesc => "cnt DESC, first_seen ASC",
            GroupOrder::KeyAsc => "group_key ASC",
            GroupOrder::FirstSeen => "first_seen ASC",
        };
        let limit = grouping
            .limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();

        let sql = format!(
            "SELECT {expr} AS group_key, {measure} AS cnt, MIN(rowid) AS first_seen \
             FROM {table}{where_sql} GROUP BY 1 ORDER BY {order}{limit}",
            table = self.table,
            where_sql = clause.sql(),
        );

        self.query(&sql, clause.params(), |row| {
            let key = match kind {
                KeyKind::Int => GroupValue::Int(row.get(0)?),
                KeyKind::Text => GroupValue::Text(row.get(0)?),
            };
            Ok(GroupCount::new(key, to_count(row.get(1)?)))
        })
    }

    fn day_hour_counts(&self, filter: &CollisionFilter) -> Result<Vec<DayHourCount>, StoreError> {
        let day = cast(columns::DAY, "BIGINT");
        let hour = cast(columns::HOUR, "BIGINT");
        let clause = self.filter_clause(filter).not_null(&day).not_null(&hour);
        let sql = format!(
            "SELECT {day}, {hour}, COUNT(DISTINCT {id}) FROM {table}{where_sql} \
             GROUP BY 1, 2 ORDER BY 1, 2",
            id = quote_ident(columns::COLLISION_ID),
            table = self.table,
            where_sql = clause.sql(),
        );

        self.query(&sql, clause.params(), |row| {
            Ok(DayHourCount {
                day: row.get(0)?,
                hour: row.get(1)?,
                count: to_count(row.get(2)?),
            })
        })
    }

    fn safety_counts(&self, filter: &CollisionFilter) -> Result<SafetyStats, StoreError> {
        let clause = self.filter_clause(filter);
        let person = quote_ident(columns::PERSON_ID);
        let flag = cast(columns::SAFETY_USED, "BIGINT");
        let sql = format!(
            "SELECT COUNT(DISTINCT {person}) FILTER (WHERE {flag} = 1), \
             COUNT(DISTINCT {person}) FILTER (WHERE {flag} = 0) \
             FROM {table}{where_sql}",
            table = self.table,
            where_sql = clause.sql(),
        );

        self.query_one(&sql, clause.params(), |row| {
            Ok(SafetyStats {
                used: to_count(row.get(0)?),
                not_used: to_count(row.get(1)?),
            })
        })
    }

    fn geo_candidates(
        &self,
        filter: &CollisionFilter,
        bounds: &BoundingBox,
        limit: usize,
    ) -> Result<Vec<CollisionRecord>, StoreError> {
        let lat = cast(columns::LATITUDE, "DOUBLE");
        let lon = cast(columns::LONGITUDE, "DOUBLE");
        let clause = self
            .filter_clause(filter)
            .not_null(&lat)
            .not_null(&lon)
            .between(&lat, bounds.south, bounds.north)
            .between(&lon, bounds.west, bounds.east);

        self.records(&clause, limit)
    }

    fn head(&self, limit: usize) -> Result<Vec<CollisionRecord>, StoreError> {
        self.records(&WhereClause::new(), limit)
    }
}

/// Opens a [`DuckDbStore`] on a blocking thread.
#[derive(Debug, Clone, Default)]
pub struct DuckDbProvider {
    config: DuckDbConfig,
}

impl DuckDbProvider {
    /// Creates a provider for the given configuration.
    #[must_use]
    pub const fn new(config: DuckDbConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DatasetProvider for DuckDbProvider {
    fn backend(&self) -> Backend {
        Backend::DuckDb
    }

    async fn open(&self) -> Result<Arc<dyn CollisionStore>, LoadError> {
        let config = self.config.clone();
        let store = tokio::task::spawn_blocking(move || DuckDbStore::open(&config))
            .await
            .map_err(|e| LoadError::Task {
                message: e.to_string(),
            })??;

        let rows = store.record_count()?;
        let geo = store.geo_record_count()?;
        log::info!("{rows} rows, {geo} with coordinates");

        Ok(Arc::new(store))
    }
}

fn table_columns(pool: &DuckDbPool, table: &str) -> Result<Vec<String>, LoadError> {
    let conn = pool.acquire()?;
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_name = ? ORDER BY ordinal_position",
    )?;
    let names = stmt
        .query_map(duckdb::params![table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn cast(column: &str, sql_type: &str) -> String {
    format!("CAST({} AS {sql_type})", quote_ident(column))
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Select list matching [`read_record`]'s column positions.
fn record_select(timestamp_expr: &str, year_expr: &str) -> String {
    [
        cast(columns::COLLISION_ID, "BIGINT"),
        format!("strftime({timestamp_expr}, '{TIMESTAMP_FORMAT}')"),
        year_expr.to_string(),
        cast(columns::HOUR, "BIGINT"),
        cast(columns::DAY, "BIGINT"),
        cast(columns::SEASON, "VARCHAR"),
        cast(columns::BOROUGH, "VARCHAR"),
        cast(columns::LATITUDE, "DOUBLE"),
        cast(columns::LONGITUDE, "DOUBLE"),
        cast(columns::VEHICLE_TYPE, "VARCHAR"),
        cast(columns::CONTRIBUTING_FACTOR, "VARCHAR"),
        cast(columns::PERSON_ID, "VARCHAR"),
        cast(columns::PERSON_TYPE, "VARCHAR"),
        cast(columns::PERSON_INJURY, "VARCHAR"),
        cast(columns::PERSONS_INJURED, "BIGINT"),
        cast(columns::PERSONS_KILLED, "BIGINT"),
        cast(columns::SAFETY_USED, "BIGINT"),
    ]
    .join(", ")
}

fn read_record(row: &duckdb::Row<'_>) -> duckdb::Result<CollisionRecord> {
    let timestamp: Option<String> = row.get(1)?;
    let year: Option<i64> = row.get(2)?;
    let hour: Option<i64> = row.get(3)?;
    let day: Option<i64> = row.get(4)?;
    let safety: Option<i64> = row.get(16)?;

    let mut record = CollisionRecord {
        collision_id: row.get::<_, Option<i64>>(0)?.unwrap_or_default(),
        crash_timestamp: timestamp
            .and_then(|ts| NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).ok()),
        year: year.and_then(|y| i32::try_from(y).ok()),
        hour_of_day: hour.and_then(|h| u8::try_from(h).ok()),
        day_of_week: day.and_then(|d| u8::try_from(d).ok()),
        season: row.get(5)?,
        borough: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        vehicle_type: row.get(9)?,
        contributing_factor: row.get(10)?,
        person_id: row.get(11)?,
        person_type: row.get(12)?,
        injury_status: row.get(13)?,
        persons_injured_count: row.get(14)?,
        persons_killed_count: row.get(15)?,
        safety_equipment_used: safety.and_then(|s| match s {
            1 => Some(true),
            0 => Some(false),
            _ => None,
        }),
    };
    record.derive_time_attributes();
    Ok(record)
}
