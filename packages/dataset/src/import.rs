//! Writes parsed collision records into a `DuckDB` table.
//!
//! The table is dropped and recreated on every import, rows are inserted in
//! multi-row `INSERT` chunks, indexes are built after the data is in, and
//! the final row and collision counts are read back for verification.

use std::path::Path;

use crash_map_collision_models::{CollisionRecord, columns};
use duckdb::Connection;

use crate::LoadError;
use crate::progress::ProgressCallback;
use crate::sql::{quote_ident, validate_table_name};

/// Rows per `INSERT` statement unless overridden.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Column definitions of the collision table, in insert order.
const SCHEMA: &[(&str, &str)] = &[
    (columns::COLLISION_ID, "BIGINT NOT NULL"),
    (columns::CRASH_DATE, "TIMESTAMP"),
    (columns::YEAR, "INTEGER"),
    (columns::HOUR, "INTEGER"),
    (columns::DAY, "INTEGER"),
    (columns::SEASON, "VARCHAR"),
    (columns::BOROUGH, "VARCHAR"),
    (columns::LATITUDE, "DOUBLE"),
    (columns::LONGITUDE, "DOUBLE"),
    (columns::VEHICLE_TYPE, "VARCHAR"),
    (columns::CONTRIBUTING_FACTOR, "VARCHAR"),
    (columns::PERSON_ID, "VARCHAR"),
    (columns::PERSON_TYPE, "VARCHAR"),
    (columns::PERSON_INJURY, "VARCHAR"),
    (columns::PERSONS_INJURED, "INTEGER"),
    (columns::PERSONS_KILLED, "INTEGER"),
    (columns::SAFETY_USED, "INTEGER"),
];

/// Secondary indexes: name suffix and indexed columns.
const INDEXES: &[(&str, &[&str])] = &[
    ("collision_id", &[columns::COLLISION_ID]),
    ("crash_date", &[columns::CRASH_DATE]),
    ("year", &[columns::YEAR]),
    ("borough", &[columns::BOROUGH]),
    ("person_type", &[columns::PERSON_TYPE]),
    ("location", &[columns::LATITUDE, columns::LONGITUDE]),
];

/// Outcome of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows reported inserted by the `INSERT` statements.
    pub inserted: u64,
    /// Rows counted in the table afterwards.
    pub rows: u64,
    /// Distinct collision ids counted in the table afterwards.
    pub collisions: u64,
}

/// Drops `table` if it exists and recreates it empty.
///
/// `table` must already be a quoted identifier.
///
/// # Errors
///
/// * If a statement fails
pub fn create_table(conn: &Connection, table: &str) -> Result<(), LoadError> {
    let definitions = SCHEMA
        .iter()
        .map(|(name, sql_type)| format!("{} {sql_type}", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(",\n    ");

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} (\n    {definitions}\n);"
    ))?;
    Ok(())
}

/// Inserts `records` in chunks of `chunk_size` rows.
///
/// # Errors
///
/// * If preparing or executing an `INSERT` fails
pub fn insert_records(
    conn: &Connection,
    table: &str,
    records: &[CollisionRecord],
    chunk_size: usize,
    progress: &dyn ProgressCallback,
) -> Result<u64, LoadError> {
    let column_list = SCHEMA
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");
    let row_placeholders = SCHEMA
        .iter()
        .map(|(name, _)| {
            if *name == columns::CRASH_DATE {
                "CAST(? AS TIMESTAMP)"
            } else {
                "?"
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    progress.set_total(records.len() as u64);
    let mut total_inserted = 0u64;

    for chunk in records.chunks(chunk_size.max(1)) {
        let mut sql = format!("INSERT INTO {table} ({column_list}) VALUES ");
        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            sql.push_str(&row_placeholders);
            sql.push(')');
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for record in chunk {
            stmt.raw_bind_parameter(param_idx, record.collision_id)?;
            stmt.raw_bind_parameter(param_idx + 1, record.timestamp_label())?;
            stmt.raw_bind_parameter(param_idx + 2, record.year)?;
            stmt.raw_bind_parameter(param_idx + 3, record.hour_of_day.map(i32::from))?;
            stmt.raw_bind_parameter(param_idx + 4, record.day_of_week.map(i32::from))?;
            stmt.raw_bind_parameter(param_idx + 5, record.season.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 6, record.borough.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 7, record.latitude)?;
            stmt.raw_bind_parameter(param_idx + 8, record.longitude)?;
            stmt.raw_bind_parameter(param_idx + 9, record.vehicle_type.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 10, record.contributing_factor.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 11, record.person_id.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 12, record.person_type.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 13, record.injury_status.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 14, record.persons_injured_count)?;
            stmt.raw_bind_parameter(param_idx + 15, record.persons_killed_count)?;
            stmt.raw_bind_parameter(
                param_idx + 16,
                record.safety_equipment_used.map(i32::from),
            )?;
            param_idx += SCHEMA.len();
        }

        let rows = stmt.raw_execute()?;
        total_inserted += u64::try_from(rows).unwrap_or(0);
        progress.inc(chunk.len() as u64);
    }

    progress.finish(format!("Inserted {total_inserted} rows"));
    Ok(total_inserted)
}

/// Creates the secondary indexes on `table`.
///
/// # Errors
///
/// * If an index cannot be created
pub fn create_indexes(conn: &Connection, table_name: &str) -> Result<(), LoadError> {
    let table = validate_table_name(table_name)?;
    for (suffix, index_columns) in INDEXES {
        let index = quote_ident(&format!("idx_{table_name}_{suffix}"));
        let cols = index_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        log::debug!("Creating index {index}");
        conn.execute_batch(&format!("CREATE INDEX {index} ON {table} ({cols});"))?;
    }
    Ok(())
}

/// Returns the row count and distinct collision count of `table`.
///
/// # Errors
///
/// * If the count query fails
pub fn verify(conn: &Connection, table: &str) -> Result<(u64, u64), LoadError> {
    let (rows, collisions): (i64, i64) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COUNT(DISTINCT {}) FROM {table}",
            quote_ident(columns::COLLISION_ID)
        ),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((
        u64::try_from(rows).unwrap_or(0),
        u64::try_from(collisions).unwrap_or(0),
    ))
}

/// Writes `records` into `table` of the database at `path`, replacing any
/// previous contents.
///
/// # Errors
///
/// * If `table` is not a plain identifier
/// * If the database cannot be opened or written
pub fn write_table(
    path: &Path,
    table: &str,
    records: &[CollisionRecord],
    chunk_size: usize,
    progress: &dyn ProgressCallback,
) -> Result<ImportSummary, LoadError> {
    let quoted = validate_table_name(table)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;

    log::info!("Creating table {quoted}...");
    create_table(&conn, &quoted)?;

    log::info!("Inserting {} rows in chunks of {chunk_size}...", records.len());
    let inserted = insert_records(&conn, &quoted, records, chunk_size, progress)?;

    log::info!("Creating indexes...");
    create_indexes(&conn, table)?;

    let (rows, collisions) = verify(&conn, &quoted)?;
    log::info!("Table {quoted} holds {rows} rows, {collisions} unique collisions");

    Ok(ImportSummary {
        inserted,
        rows,
        collisions,
    })
}
