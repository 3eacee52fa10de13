//! Server configuration read from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crash_map_dataset::{Backend, CsvProvider, Dataset, DuckDbConfig, DuckDbProvider};

/// Flat file read when `CSV_FILE` is unset.
pub const DEFAULT_CSV_FILE: &str = "crashes_cleaned.csv";

/// Alternate flat-file location used when it exists and `CSV_FILE` is unset.
pub const FALLBACK_CSV_FILE: &str = "backend/crashes_cleaned.csv";

/// Errors raised while reading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be parsed.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Everything needed to start the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind (`BIND_ADDR`).
    pub bind_addr: String,
    /// Port to bind (`PORT`).
    pub port: u16,
    /// Dataset backend (`DATASET_BACKEND`).
    pub backend: Backend,
    /// Flat file for the CSV backend (`CSV_FILE`).
    pub csv_file: PathBuf,
    /// Remote CSV fetched once when `csv_file` is absent.
    pub csv_url: Option<String>,
    /// Settings for the `DuckDB` backend.
    pub duckdb: DuckDbConfig,
}

impl ServerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// * If a variable is set to an unparseable value
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults
    /// for unset or empty variables.
    ///
    /// # Errors
    ///
    /// * If a variable is set to an unparseable value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = DuckDbConfig::default();

        let csv_file = get("CSV_FILE").map_or_else(default_csv_file, PathBuf::from);
        let max_age_secs = parse(&get, "DUCKDB_MAX_CONNECTION_AGE_SECS")?
            .unwrap_or_else(|| defaults.max_connection_age.as_secs());

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse(&get, "PORT")?.unwrap_or(8080),
            backend: parse(&get, "DATASET_BACKEND")?.unwrap_or(Backend::Csv),
            csv_file,
            csv_url: get("CSV_URL"),
            duckdb: DuckDbConfig {
                path: get("DUCKDB_PATH").map_or(defaults.path, PathBuf::from),
                table: get("DUCKDB_TABLE").unwrap_or(defaults.table),
                pool_size: parse(&get, "DUCKDB_POOL_SIZE")?.unwrap_or(defaults.pool_size),
                max_connection_age: Duration::from_secs(max_age_secs),
            },
        })
    }

    /// Builds the unloaded dataset for the configured backend.
    #[must_use]
    pub fn dataset(&self) -> Dataset {
        match self.backend {
            Backend::Csv => Dataset::new(CsvProvider::new(&self.csv_file, self.csv_url.clone())),
            Backend::DuckDb => Dataset::new(DuckDbProvider::new(self.duckdb.clone())),
        }
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

fn default_csv_file() -> PathBuf {
    if Path::new(FALLBACK_CSV_FILE).exists() {
        PathBuf::from(FALLBACK_CSV_FILE)
    } else {
        PathBuf::from(DEFAULT_CSV_FILE)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.backend, Backend::Csv);
        assert_eq!(config.csv_url, None);
        assert_eq!(config.duckdb, DuckDbConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("DATASET_BACKEND", "DuckDB"),
            ("CSV_FILE", "/tmp/rows.csv"),
            ("CSV_URL", "https://example.org/rows.csv"),
            ("DUCKDB_TABLE", "persons"),
            ("DUCKDB_POOL_SIZE", "2"),
            ("DUCKDB_MAX_CONNECTION_AGE_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.backend, Backend::DuckDb);
        assert_eq!(config.csv_file, PathBuf::from("/tmp/rows.csv"));
        assert_eq!(config.csv_url.as_deref(), Some("https://example.org/rows.csv"));
        assert_eq!(config.duckdb.table, "persons");
        assert_eq!(config.duckdb.pool_size, 2);
        assert_eq!(config.duckdb.max_connection_age, Duration::from_secs(60));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = config(&[("PORT", " "), ("CSV_URL", "")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.csv_url, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidValue { var: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("DATASET_BACKEND", "postgres")]),
            Err(ConfigError::InvalidValue {
                var: "DATASET_BACKEND",
                ..
            })
        ));
    }

    #[test]
    fn builds_dataset_for_backend() {
        let config = config(&[("DATASET_BACKEND", "duckdb")]).unwrap();
        let dataset = config.dataset();
        assert_eq!(dataset.backend(), Backend::DuckDb);
        assert!(!dataset.is_loaded());
    }
}
