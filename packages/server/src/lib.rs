#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the crash map application.
//!
//! Serves filtered collision statistics, filter options, keyword search and
//! a raw data preview from a dataset that is loaded on first use and shared
//! by every request. The dataset comes either from a CSV file (optionally
//! downloaded once) or from a `DuckDB` table built by the import tool.

pub mod config;
mod handlers;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use crash_map_dataset::{Backend, Dataset};

pub use config::{ConfigError, ServerConfig};
pub use handlers::ApiError;

/// Shared application state.
pub struct AppState {
    /// Lazily loaded collision dataset.
    pub dataset: Dataset,
}

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// An environment variable holds an invalid value.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Binding or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Registers the `/api` routes. Malformed JSON bodies are answered with
/// the same `{"error": ...}` body as every other failure.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(
                web::JsonConfig::default().error_handler(|e, _req| ApiError::from(e).into()),
            )
            .route("/health", web::get().to(handlers::health))
            .route("/filters", web::get().to(handlers::filters))
            .route("/stats", web::post().to(handlers::stats))
            .route("/search", web::post().to(handlers::search))
            .route("/data", web::get().to(handlers::data)),
    );
}

/// Starts the crash map API server.
///
/// Reads [`ServerConfig`] from the environment and serves the API until
/// the server stops. The dataset is not loaded here; the first request
/// that needs it triggers the load. The caller provides the async runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// * If the configuration is invalid
/// * If the HTTP server fails to bind or encounters a runtime error
#[allow(clippy::future_not_send)]
pub async fn run_server() -> Result<(), ServerError> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env()?;
    log::info!("Dataset backend: {}", config.backend);
    match config.backend {
        Backend::Csv => {
            log::info!("CSV file: {}", config.csv_file.display());
        }
        Backend::DuckDb => {
            log::info!(
                "DuckDB: {} (table {}, {} connections)",
                config.duckdb.path.display(),
                config.duckdb.table,
                config.duckdb.pool_size
            );
        }
    }

    let state = web::Data::new(AppState {
        dataset: config.dataset(),
    });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
