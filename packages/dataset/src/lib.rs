#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Collision dataset access.
//!
//! A dataset is materialized once per process by a [`DatasetProvider`] and
//! exposed as a [`CollisionStore`]: a small set of filtered aggregate
//! primitives that the analytics engine composes into a statistics bundle.
//! Two stores exist, an in-memory table parsed from CSV ([`MemoryStore`])
//! and a `DuckDB` table queried through a read-only connection pool
//! ([`DuckDbStore`]). Both answer every primitive identically for the same
//! rows.

pub mod download;
pub mod flat_file;
pub mod import;
pub mod memory;
pub mod parsing;
pub mod pool;
pub mod progress;
pub mod provider;
pub mod relational;
pub mod sql;

use std::path::PathBuf;

use crash_map_analytics_models::{GroupCount, SafetyStats};
use crash_map_collision_models::{BoundingBox, CollisionFilter, CollisionRecord, GroupKey};
use strum_macros::{AsRefStr, Display, EnumString};

pub use flat_file::CsvProvider;
pub use memory::MemoryStore;
pub use provider::{Dataset, DatasetProvider};
pub use relational::{DuckDbConfig, DuckDbProvider, DuckDbStore};

/// Errors that make the dataset unavailable.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The flat file does not exist and no download URL is configured.
    #[error("Dataset file not found: {} (set CSV_URL to download it)", path.display())]
    SourceNotFound {
        /// Expected location of the file.
        path: PathBuf,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote file could not be fetched.
    #[error("Download failed: {message}")]
    Download {
        /// What went wrong.
        message: String,
    },

    /// `DuckDB` error while opening or inspecting the database.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// A sanity query against a freshly opened store failed.
    #[error("Store query failed: {0}")]
    Store(#[from] StoreError),

    /// No column looks like a crash timestamp.
    #[error("No date column found. Available columns: {columns:?}")]
    MissingDateColumn {
        /// Header names that were inspected.
        columns: Vec<String>,
    },

    /// The table does not exist.
    #[error("Table '{table}' does not exist")]
    MissingTable {
        /// Table name.
        table: String,
    },

    /// The table lacks columns the queries need.
    #[error("Table '{table}' is missing columns: {missing:?}")]
    MissingColumns {
        /// Table name.
        table: String,
        /// Missing column names.
        missing: Vec<String>,
    },

    /// The configured table name is not a plain identifier.
    #[error("Invalid table name '{name}'")]
    InvalidTableName {
        /// Rejected name.
        name: String,
    },

    /// The blocking loader task panicked or was cancelled.
    #[error("Dataset loader task failed: {message}")]
    Task {
        /// Join error description.
        message: String,
    },
}

/// Errors raised by a loaded store while answering a query.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `DuckDB` query error.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// A stored value could not be converted to its logical type.
    #[error("Conversion error: {message}")]
    Conversion {
        /// What could not be converted.
        message: String,
    },
}

/// Which storage backend serves the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Backend {
    /// In-memory table parsed from a CSV file.
    Csv,
    /// `DuckDB` table.
    #[strum(serialize = "duckdb")]
    DuckDb,
}

/// Collision-level totals over a filtered record set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Distinct collision ids.
    pub crashes: u64,
    /// Rows.
    pub persons: u64,
    /// Sum of the per-row injured counter (absent = 0).
    pub injuries: i64,
    /// Sum of the per-row killed counter (absent = 0).
    pub deaths: i64,
}

/// What a group's count measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Number of rows in the group.
    Rows,
    /// Number of distinct collision ids in the group.
    DistinctCollisions,
}

/// How groups are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrder {
    /// Descending count, ties in order of first appearance.
    CountDesc,
    /// Ascending group value.
    KeyAsc,
    /// Order in which each group value first appears.
    FirstSeen,
}

/// A grouped count request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grouping {
    /// Dimension to group by. Rows where it is absent are ignored.
    pub key: GroupKey,
    /// What each group counts.
    pub measure: Measure,
    /// Result order.
    pub order: GroupOrder,
    /// Keep at most this many groups after ordering.
    pub limit: Option<usize>,
}

impl Grouping {
    /// Row counts ordered by descending count.
    #[must_use]
    pub const fn rows_desc(key: GroupKey) -> Self {
        Self {
            key,
            measure: Measure::Rows,
            order: GroupOrder::CountDesc,
            limit: None,
        }
    }

    /// Distinct-collision counts ordered by group value.
    #[must_use]
    pub const fn collisions_by_key(key: GroupKey) -> Self {
        Self {
            key,
            measure: Measure::DistinctCollisions,
            order: GroupOrder::KeyAsc,
            limit: None,
        }
    }

    /// Returns the same grouping with a result limit.
    #[must_use]
    pub const fn top(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Distinct collisions for one (day of week, hour of day) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayHourCount {
    /// Day code (0 = Monday).
    pub day: i64,
    /// Hour of day.
    pub hour: i64,
    /// Distinct collision ids.
    pub count: u64,
}

/// Filtered aggregate primitives over a loaded collision dataset.
///
/// Every method applies the filter conjunctively before aggregating.
/// Implementations are synchronous and may block; callers on an async
/// runtime should move the work onto a blocking thread.
pub trait CollisionStore: Send + Sync {
    /// Backend serving this store.
    fn backend(&self) -> Backend;

    /// Source column names, in source order.
    fn columns(&self) -> &[String];

    /// Returns `true` if the source has a column with this name.
    fn has_column(&self, name: &str) -> bool {
        self.columns().iter().any(|c| c == name)
    }

    /// Total number of rows.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    fn record_count(&self) -> Result<u64, StoreError>;

    /// Number of rows carrying both coordinates.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    fn geo_record_count(&self) -> Result<u64, StoreError>;

    /// Crash, person, injury and death totals.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    fn totals(&self, filter: &CollisionFilter) -> Result<Totals, StoreError>;

    /// Grouped counts for one dimension.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    /// * If a group value cannot be converted
    fn group_counts(
        &self,
        filter: &CollisionFilter,
        grouping: &Grouping,
    ) -> Result<Vec<GroupCount>, StoreError>;

    /// Distinct collisions per (day, hour), ordered by day then hour.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    fn day_hour_counts(&self, filter: &CollisionFilter) -> Result<Vec<DayHourCount>, StoreError>;

    /// Distinct persons with the safety flag set and unset.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    fn safety_counts(&self, filter: &CollisionFilter) -> Result<SafetyStats, StoreError>;

    /// The first `limit` rows, in dataset order, whose coordinates are
    /// present and inside `bounds`.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    fn geo_candidates(
        &self,
        filter: &CollisionFilter,
        bounds: &BoundingBox,
        limit: usize,
    ) -> Result<Vec<CollisionRecord>, StoreError>;

    /// The first `limit` rows in dataset order.
    ///
    /// # Errors
    ///
    /// * If the backend query fails
    fn head(&self, limit: usize) -> Result<Vec<CollisionRecord>, StoreError>;
}
