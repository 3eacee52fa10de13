#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV to `DuckDB` import for the collision dataset.
//!
//! Parses the cleaned collision CSV with the same rules the server's CSV
//! backend uses, then replaces the target table with the parsed rows so the
//! server can run against `DATASET_BACKEND=duckdb`.

use std::path::PathBuf;

use clap::Parser;
use crash_map_dataset::LoadError;
use crash_map_dataset::flat_file::{log_summary, read_path};
use crash_map_dataset::import::{DEFAULT_CHUNK_SIZE, ImportSummary, write_table};
use crash_map_dataset::progress::ProgressCallback;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "crash_map_import",
    about = "Import the collision CSV into a DuckDB table"
)]
pub struct Args {
    /// CSV file to import
    #[arg(long, default_value = "crashes_cleaned.csv")]
    pub csv: PathBuf,
    /// `DuckDB` database file to write
    #[arg(long, default_value = "data/crashes.duckdb")]
    pub database: PathBuf,
    /// Table to (re)create
    #[arg(long, default_value = "crashes")]
    pub table: String,
    /// Only import the first N data rows
    #[arg(long, env = "SAMPLE_ROWS")]
    pub sample_rows: Option<usize>,
    /// Rows per `INSERT` statement
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

/// Errors that abort an import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The input CSV does not exist.
    #[error("CSV file not found: {}", path.display())]
    MissingCsv {
        /// Path given on the command line.
        path: PathBuf,
    },
    /// Parsing the CSV or writing the table failed.
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// An `indicatif` row counter for the table being written.
pub struct IndicatifProgress(ProgressBar);

impl IndicatifProgress {
    /// Adds a bar labelled with `table` to `multi`.
    #[must_use]
    pub fn rows_bar(multi: &MultiProgress, table: &str) -> Self {
        let bar = multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len} [{eta}]") {
            bar.set_style(style);
        }
        bar.set_message(format!("Writing {table}"));
        Self(bar)
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.0.set_length(total);
    }

    fn inc(&self, delta: u64) {
        self.0.inc(delta);
    }

    fn finish(&self, msg: String) {
        self.0.finish_with_message(msg);
    }
}

/// Routes `RUST_LOG`-filtered `pretty_env_logger` output through `multi`
/// so log lines print above the bar.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();
    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    log::set_max_level(logger.filter());
    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialized");
    }
    multi
}

/// Imports `args.csv` into `args.table` of `args.database`, replacing the
/// table if it exists.
///
/// # Errors
///
/// * If the CSV file does not exist or cannot be parsed
/// * If the table name is invalid or the database cannot be written
pub fn run(args: &Args, progress: &dyn ProgressCallback) -> Result<ImportSummary, ImportError> {
    if !args.csv.is_file() {
        return Err(ImportError::MissingCsv {
            path: args.csv.clone(),
        });
    }

    match args.sample_rows {
        Some(n) => log::info!("Reading first {n} rows of {}...", args.csv.display()),
        None => log::info!("Reading {}...", args.csv.display()),
    }
    let table = read_path(&args.csv, args.sample_rows)?;
    log_summary(&table);

    let summary = write_table(
        &args.database,
        &args.table,
        &table.records,
        args.chunk_size,
        progress,
    )?;

    if summary.rows != table.records.len() as u64 {
        log::warn!(
            "Parsed {} rows but the table holds {}",
            table.records.len(),
            summary.rows
        );
    }
    log::info!(
        "Imported {} rows ({} collisions) into {}",
        summary.rows,
        summary.collisions,
        args.database.display()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use crash_map_dataset::progress::NullProgress;

    use super::*;

    const SAMPLE: &str = "\
COLLISION_ID,CRASH_DATE,BOROUGH,LATITUDE,LONGITUDE,PERSON_ID,PERSON_TYPE
1,2022-03-14 17:05:00,BROOKLYN,40.65,-73.95,p1,Pedestrian
1,2022-03-14 17:05:00,BROOKLYN,40.65,-73.95,p2,Occupant
2,2021-06-01 08:00:00,QUEENS,40.7,-73.8,p3,Cyclist
3,2020-01-01 00:30:00,BRONX,,,p4,Occupant
";

    fn temp_path(ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!("crash_map_import_{}.{ext}", uuid::Uuid::new_v4()))
    }

    fn args(csv: PathBuf, database: PathBuf) -> Args {
        Args {
            csv,
            database,
            table: "crashes".to_string(),
            sample_rows: None,
            chunk_size: 2,
        }
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "crash_map_import",
            "--csv",
            "in.csv",
            "--database",
            "out.duckdb",
            "--table",
            "persons",
            "--sample-rows",
            "10",
            "--chunk-size",
            "100",
        ])
        .unwrap();

        assert_eq!(args.csv, PathBuf::from("in.csv"));
        assert_eq!(args.database, PathBuf::from("out.duckdb"));
        assert_eq!(args.table, "persons");
        assert_eq!(args.sample_rows, Some(10));
        assert_eq!(args.chunk_size, 100);
    }

    #[test]
    fn defaults_match_server_configuration() {
        let args = Args::try_parse_from(["crash_map_import"]).unwrap();
        assert_eq!(args.csv, PathBuf::from("crashes_cleaned.csv"));
        assert_eq!(args.database, PathBuf::from("data/crashes.duckdb"));
        assert_eq!(args.table, "crashes");
        assert_eq!(args.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn imports_csv_into_table() {
        let csv = temp_path("csv");
        let database = temp_path("duckdb");
        std::fs::write(&csv, SAMPLE).unwrap();

        let summary = run(&args(csv.clone(), database.clone()), &NullProgress).unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.collisions, 3);

        let conn = duckdb::Connection::open(&database).unwrap();
        let (year, hour): (i32, i32) = conn
            .query_row(
                "SELECT \"YEAR\", \"HOUR\" FROM crashes WHERE \"PERSON_ID\" = 'p3'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((year, hour), (2021, 8));
        drop(conn);

        let _ = std::fs::remove_file(&csv);
        let _ = std::fs::remove_file(&database);
    }

    #[test]
    fn sample_rows_limits_import() {
        let csv = temp_path("csv");
        let database = temp_path("duckdb");
        std::fs::write(&csv, SAMPLE).unwrap();

        let mut args = args(csv.clone(), database.clone());
        args.sample_rows = Some(2);
        let summary = run(&args, &NullProgress).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.collisions, 1);

        let _ = std::fs::remove_file(&csv);
        let _ = std::fs::remove_file(&database);
    }

    #[test]
    fn progress_bar_counts_written_rows() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::rows_bar(&multi, "crashes");
        assert_eq!(progress.0.message(), "Writing crashes");

        progress.set_total(10);
        progress.inc(4);
        assert_eq!(progress.0.length(), Some(10));
        assert_eq!(progress.0.position(), 4);

        progress.finish("done".to_string());
        assert!(progress.0.is_finished());
    }

    #[test]
    fn missing_csv_is_reported() {
        let args = args(temp_path("csv"), temp_path("duckdb"));
        assert!(matches!(
            run(&args, &NullProgress),
            Err(ImportError::MissingCsv { .. })
        ));
        assert!(!args.database.exists());
    }
}
