//! CSV collision table.
//!
//! Headers are matched against the canonical column names after
//! normalization (case-insensitive, underscores treated as spaces), so both
//! `VEHICLE TYPE CODE 1` and `vehicle_type_code_1` are recognized. Rows with
//! more fields than the header or without a usable `COLLISION_ID` are
//! skipped and counted. Short rows are kept with the missing cells absent.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use crash_map_collision_models::{CollisionRecord, columns};

use crate::parsing::{
    find_date_column, non_empty, normalize_header, parse_flag, parse_float, parse_int,
    parse_timestamp,
};
use crate::{Backend, CollisionStore, DatasetProvider, LoadError, MemoryStore, download};

/// Records parsed from a CSV file.
#[derive(Debug, Clone, Default)]
pub struct FlatTable {
    /// Header names as they appear in the file.
    pub columns: Vec<String>,
    /// Parsed rows in file order.
    pub records: Vec<CollisionRecord>,
    /// Rows dropped as malformed.
    pub skipped: u64,
}

/// Column positions resolved from the header row.
#[derive(Debug, Default)]
struct ColumnLayout {
    collision_id: Option<usize>,
    crash_date: usize,
    hour: Option<usize>,
    day: Option<usize>,
    season: Option<usize>,
    borough: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    vehicle_type: Option<usize>,
    contributing_factor: Option<usize>,
    person_id: Option<usize>,
    person_type: Option<usize>,
    person_injury: Option<usize>,
    persons_injured: Option<usize>,
    persons_killed: Option<usize>,
    safety_used: Option<usize>,
}

impl ColumnLayout {
    fn resolve(headers: &[String]) -> Result<Self, LoadError> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let find = |name: &str| {
            let wanted = normalize_header(name);
            normalized.iter().position(|h| *h == wanted)
        };

        let crash_date =
            find_date_column(headers).ok_or_else(|| LoadError::MissingDateColumn {
                columns: headers.to_vec(),
            })?;

        Ok(Self {
            collision_id: find(columns::COLLISION_ID),
            crash_date,
            hour: find(columns::HOUR),
            day: find(columns::DAY),
            season: find(columns::SEASON),
            borough: find(columns::BOROUGH),
            latitude: find(columns::LATITUDE),
            longitude: find(columns::LONGITUDE),
            vehicle_type: find(columns::VEHICLE_TYPE),
            contributing_factor: find(columns::CONTRIBUTING_FACTOR),
            person_id: find(columns::PERSON_ID),
            person_type: find(columns::PERSON_TYPE),
            person_injury: find(columns::PERSON_INJURY),
            persons_injured: find(columns::PERSONS_INJURED),
            persons_killed: find(columns::PERSONS_KILLED),
            safety_used: find(columns::SAFETY_USED),
        })
    }

    /// Builds a record from one row, or `None` if the row is malformed.
    fn record(&self, row: &[String]) -> Option<CollisionRecord> {
        let cell = |index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .map(String::as_str)
                .unwrap_or_default()
        };

        let collision_id = parse_int(cell(self.collision_id))?;

        let mut record = CollisionRecord {
            collision_id,
            crash_timestamp: parse_timestamp(cell(Some(self.crash_date))),
            year: None,
            hour_of_day: parse_int(cell(self.hour)).and_then(|h| u8::try_from(h).ok()),
            day_of_week: parse_int(cell(self.day)).and_then(|d| u8::try_from(d).ok()),
            season: non_empty(cell(self.season)),
            borough: non_empty(cell(self.borough)),
            latitude: parse_float(cell(self.latitude)),
            longitude: parse_float(cell(self.longitude)),
            vehicle_type: non_empty(cell(self.vehicle_type)),
            contributing_factor: non_empty(cell(self.contributing_factor)),
            person_id: non_empty(cell(self.person_id)),
            person_type: non_empty(cell(self.person_type)),
            injury_status: non_empty(cell(self.person_injury)),
            persons_injured_count: parse_int(cell(self.persons_injured)),
            persons_killed_count: parse_int(cell(self.persons_killed)),
            safety_equipment_used: parse_flag(cell(self.safety_used)),
        };
        record.derive_time_attributes();
        Some(record)
    }
}

/// Parses collision rows from any reader.
///
/// # Errors
///
/// * If the header has no date column
/// * If reading from `reader` fails
pub fn read_table<R: Read>(reader: R, max_rows: Option<usize>) -> Result<FlatTable, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();
    let layout = ColumnLayout::resolve(&columns)?;

    let mut table = FlatTable {
        columns,
        ..FlatTable::default()
    };
    let mut raw = csv::ByteRecord::new();
    let mut row = Vec::with_capacity(table.columns.len());

    loop {
        if max_rows.is_some_and(|max| table.records.len() >= max) {
            break;
        }

        match csv_reader.read_byte_record(&mut raw) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                log::debug!("Skipping unreadable row: {e}");
                table.skipped += 1;
                continue;
            }
        }

        if raw.len() > table.columns.len() {
            table.skipped += 1;
            continue;
        }

        row.clear();
        row.extend(raw.iter().map(|f| String::from_utf8_lossy(f).into_owned()));

        match layout.record(&row) {
            Some(record) => table.records.push(record),
            None => table.skipped += 1,
        }
    }

    Ok(table)
}

/// Parses collision rows from a CSV file.
///
/// # Errors
///
/// * If the file cannot be opened or read
/// * If the header has no date column
pub fn read_path(path: &Path, max_rows: Option<usize>) -> Result<FlatTable, LoadError> {
    let file = File::open(path)?;
    read_table(BufReader::new(file), max_rows)
}

/// Logs coverage diagnostics for a freshly parsed table.
pub fn log_summary(table: &FlatTable) {
    log::info!(
        "Parsed {} rows ({} skipped as malformed)",
        table.records.len(),
        table.skipped
    );

    let geo: Vec<(f64, f64)> = table
        .records
        .iter()
        .filter_map(|r| r.latitude.zip(r.longitude))
        .collect();
    if geo.is_empty() {
        log::warn!("No rows carry coordinates");
        return;
    }

    let (min_lat, max_lat, min_lon, max_lon) = geo.iter().fold(
        (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
        |(a, b, c, d), &(lat, lon)| (a.min(lat), b.max(lat), c.min(lon), d.max(lon)),
    );
    log::info!(
        "{} rows with coordinates; lat {min_lat:.4}..{max_lat:.4}, lon {min_lon:.4}..{max_lon:.4}",
        geo.len()
    );
}

/// Loads the dataset from a CSV file, downloading it first if it is absent
/// and a URL is configured.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    path: PathBuf,
    url: Option<String>,
}

impl CsvProvider {
    /// Creates a provider for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, url: Option<String>) -> Self {
        Self {
            path: path.into(),
            url,
        }
    }

    /// Location of the CSV file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DatasetProvider for CsvProvider {
    fn backend(&self) -> Backend {
        Backend::Csv
    }

    fn source_exists(&self) -> Option<bool> {
        Some(self.path.exists())
    }

    async fn open(&self) -> Result<Arc<dyn CollisionStore>, LoadError> {
        if !self.path.exists() {
            let Some(url) = &self.url else {
                return Err(LoadError::SourceNotFound {
                    path: self.path.clone(),
                });
            };
            download::fetch_to_file(url, &self.path).await?;
        }

        log::info!("Reading {}", self.path.display());
        let path = self.path.clone();
        let table = tokio::task::spawn_blocking(move || read_path(&path, None))
            .await
            .map_err(|e| LoadError::Task {
                message: e.to_string(),
            })??;
        log_summary(&table);

        Ok(Arc::new(MemoryStore::new(table.records, table.columns)))
    }
}
