//! HTTP handler functions for the crash map API.

use actix_web::error::{BlockingError, JsonPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use crash_map_analytics::{AnalyticsError, compute_filtered, list_filter_options};
use crash_map_collision_models::{FilterSpec, InvalidFilterError, columns};
use crash_map_dataset::{LoadError, StoreError};
use crash_map_search::parse_query;
use crash_map_server_models::{
    ApiErrorBody, ApiHealth, ApiRecord, ApiUnhealthy, DATA_PREVIEW_LIMIT, DataResponse,
    HealthStatus, RequiredColumns, SearchRequest, SearchResponse,
};

use crate::AppState;

/// Request failures, rendered as `{"error": ...}` bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body is not valid JSON of the expected shape.
    #[error("Invalid request body: {0}")]
    Payload(#[from] JsonPayloadError),
    /// A filter value cannot be interpreted.
    #[error(transparent)]
    InvalidFilter(#[from] InvalidFilterError),
    /// The dataset could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// A store query failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Computing statistics failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    /// The blocking worker running the query failed.
    #[error("Background task failed: {0}")]
    Blocking(#[from] BlockingError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Payload(_)
            | Self::InvalidFilter(_)
            | Self::Analytics(AnalyticsError::InvalidFilter(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Load(_) | Self::Store(_) | Self::Analytics(_) | Self::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {self:?}");
        } else {
            log::debug!("Rejected request: {self}");
        }
        HttpResponse::build(status).json(ApiErrorBody {
            error: self.to_string(),
        })
    }
}

/// `GET /api/health`
///
/// Triggers the dataset load on first call and reports what was loaded.
pub async fn health(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let dataset = &state.dataset;
    let csv_file_exists = dataset.source_exists();

    let store = match dataset.load().await {
        Ok(store) => store,
        Err(e) => {
            log::error!("Health check failed to load data: {e}");
            return Ok(
                HttpResponse::InternalServerError().json(ApiUnhealthy {
                    status: HealthStatus::Unhealthy,
                    error: format!("Failed to load data: {e}"),
                    csv_file_exists,
                }),
            );
        }
    };

    let column_count = store.columns().len();
    let required_columns = RequiredColumns {
        latitude: store.has_column(columns::LATITUDE),
        longitude: store.has_column(columns::LONGITUDE),
        borough: store.has_column(columns::BOROUGH),
    };
    let (total_records, geo_data_count) =
        web::block(move || Ok::<_, StoreError>((store.record_count()?, store.geo_record_count()?)))
            .await??;

    Ok(HttpResponse::Ok().json(ApiHealth {
        status: HealthStatus::Healthy,
        data_loaded: true,
        backend: dataset.backend().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        csv_file_exists,
        total_records: Some(total_records),
        columns: Some(column_count),
        has_geo_data: Some(geo_data_count > 0),
        geo_data_count: Some(geo_data_count),
        required_columns: Some(required_columns),
    }))
}

/// `GET /api/filters`
///
/// Lists the values available for each filter dimension.
pub async fn filters(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = state.dataset.load().await?;
    let catalog = web::block(move || list_filter_options(store.as_ref())).await??;
    Ok(HttpResponse::Ok().json(catalog))
}

/// `POST /api/stats`
///
/// Computes the statistics bundle for the posted filter.
pub async fn stats(
    state: web::Data<AppState>,
    spec: web::Json<FilterSpec>,
) -> Result<HttpResponse, ApiError> {
    let filter = spec.parse()?;
    let store = state.dataset.load().await?;
    let bundle = web::block(move || compute_filtered(store.as_ref(), &filter)).await??;
    Ok(HttpResponse::Ok().json(bundle))
}

/// `POST /api/search`
///
/// Turns a free-text query into filter selections.
pub async fn search(body: web::Json<SearchRequest>) -> HttpResponse {
    HttpResponse::Ok().json(SearchResponse {
        filters: parse_query(&body.query),
    })
}

/// `GET /api/data`
///
/// Returns the first records of the dataset and its total row count.
pub async fn data(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = state.dataset.load().await?;
    let (records, total) = web::block(move || {
        Ok::<_, StoreError>((store.head(DATA_PREVIEW_LIMIT)?, store.record_count()?))
    })
    .await??;

    Ok(HttpResponse::Ok().json(DataResponse {
        data: records.iter().map(ApiRecord::from).collect(),
        total,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, test};
    use chrono::{NaiveDate, NaiveDateTime};
    use crash_map_collision_models::CollisionRecord;
    use crash_map_dataset::{CsvProvider, Dataset, MemoryStore};
    use serde_json::{Value, json};

    use super::*;
    use crate::configure;

    fn ts(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap()
    }

    fn person(
        collision_id: i64,
        person_id: &str,
        borough: &str,
        timestamp: NaiveDateTime,
    ) -> CollisionRecord {
        let mut record = CollisionRecord {
            collision_id,
            crash_timestamp: Some(timestamp),
            borough: Some(borough.to_string()),
            latitude: Some(40.65),
            longitude: Some(-73.95),
            person_id: Some(person_id.to_string()),
            person_type: Some("Pedestrian".to_string()),
            injury_status: Some("Injured".to_string()),
            persons_injured_count: Some(1),
            persons_killed_count: Some(0),
            ..CollisionRecord::default()
        };
        record.derive_time_attributes();
        record
    }

    fn preloaded() -> AppState {
        let records = vec![
            person(100, "a", "BROOKLYN", ts(2022, 5, 2, 8)),
            person(100, "b", "BROOKLYN", ts(2022, 5, 2, 8)),
            person(200, "c", "QUEENS", ts(2021, 11, 20, 17)),
        ];
        AppState {
            dataset: Dataset::preloaded(Arc::new(MemoryStore::from_records(records))),
        }
    }

    fn missing_csv() -> AppState {
        let path = std::env::temp_dir().join("crash_map_server_missing.csv");
        AppState {
            dataset: Dataset::new(CsvProvider::new(path, None)),
        }
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_reports_loaded_dataset() {
        let app = app!(preloaded());
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["data_loaded"], true);
        assert_eq!(body["backend"], "csv");
        assert_eq!(body["total_records"], 3);
        assert_eq!(body["geo_data_count"], 3);
        assert_eq!(body["has_geo_data"], true);
        assert_eq!(body["required_columns"]["BOROUGH"], true);
    }

    #[actix_web::test]
    async fn health_reports_load_failure() {
        let app = app!(missing_csv());
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["csv_file_exists"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Failed to load data"));
    }

    #[actix_web::test]
    async fn stats_applies_filters() {
        let app = app!(preloaded());
        let req = test::TestRequest::post()
            .uri("/api/stats")
            .set_json(json!({"borough": "BROOKLYN", "year": 2022, "vehicle_type": "All"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["total_crashes"], 1);
        assert_eq!(body["total_persons"], 2);
        assert_eq!(body["by_borough"], json!({"BROOKLYN": 1}));
        assert_eq!(body["by_day_hour"], json!({"Monday": {"8": 1}}));
        assert_eq!(body["geo_data"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn stats_rejects_invalid_year() {
        let app = app!(preloaded());
        let req = test::TestRequest::post()
            .uri("/api/stats")
            .set_json(json!({"year": "twenty"}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("twenty"));
    }

    async fn post_raw(uri: &str, body: &'static str) -> (StatusCode, Value) {
        let app = app!(preloaded());
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header(("content-type", "application/json"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        (status, test::read_body_json(resp).await)
    }

    #[actix_web::test]
    async fn malformed_bodies_get_json_errors() {
        let (status, body) = post_raw("/api/stats", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        let (status, body) = post_raw("/api/search", r#"{"query": 5}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn stats_rejects_array_bodies() {
        let (status, body) = post_raw("/api/stats", "[1,2]").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn stats_fails_when_dataset_is_missing() {
        let app = app!(missing_csv());
        let req = test::TestRequest::post()
            .uri("/api/stats")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn filters_lists_options() {
        let app = app!(preloaded());
        let req = test::TestRequest::get().uri("/api/filters").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["boroughs"], json!(["All", "BROOKLYN", "QUEENS"]));
        assert_eq!(body["years"], json!(["All", "2021", "2022"]));
        assert_eq!(body["person_types"], json!(["All", "Pedestrian"]));
    }

    #[actix_web::test]
    async fn search_returns_only_recognized_keys() {
        let app = app!(preloaded());
        let req = test::TestRequest::post()
            .uri("/api/search")
            .set_json(json!({"query": "Brooklyn 2022 pedestrian crashes"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(
            body,
            json!({"filters": {"borough": "BROOKLYN", "year": "2022", "person_type": "Pedestrian"}})
        );
    }

    #[actix_web::test]
    async fn data_previews_records() {
        let app = app!(preloaded());
        let req = test::TestRequest::get().uri("/api/data").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["total"], 3);
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][columns::COLLISION_ID], 100);
        assert_eq!(rows[0][columns::VEHICLE_TYPE], "N/A");
    }
}
