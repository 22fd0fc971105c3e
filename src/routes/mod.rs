// src/routes/mod.rs

use std::path::Path;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::error;

use crate::error::LogbookError;
use crate::AppState;

pub mod actor;
pub mod archive;
pub mod extract;
pub mod health;
pub mod records;
pub mod shifts;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Logbook(#[from] LogbookError),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match &self {
            ApiError::Unauthenticated(_) => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "error": "UNAUTHENTICATED", "message": message }),
            ),
            ApiError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                json!({ "success": false, "error": "FORBIDDEN", "message": message }),
            ),
            ApiError::Logbook(LogbookError::ReportGenerationFailed {
                archived_count,
                carried_forward_count,
                ..
            }) => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "success": false,
                    "error": "REPORT_GENERATION_FAILED",
                    "message": message,
                    "archivedCount": archived_count,
                    "carriedForwardCount": carried_forward_count,
                    "reportUrl": null,
                }),
            ),
            ApiError::Logbook(e) => {
                let status = match e {
                    LogbookError::NotFound { .. } => StatusCode::NOT_FOUND,
                    LogbookError::AlreadyClosed(_) => StatusCode::CONFLICT,
                    LogbookError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    LogbookError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
                    LogbookError::ReportGenerationFailed { .. } => StatusCode::BAD_GATEWAY,
                };
                let mut body = json!({
                    "success": false,
                    "error": e.code(),
                    "message": message,
                    "retryable": e.is_retryable(),
                });
                if let LogbookError::Validation(problems) = e {
                    body["details"] = json!(problems);
                }
                (status, body)
            }
        };

        if status.is_server_error() {
            error!(%status, error = %message, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Full API. `reports_dir` is served under `/reports` when reports live on local disk.
pub fn router(state: AppState, reports_dir: Option<&Path>) -> Router {
    // Very permissive CORS for local dev (tighten for prod)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health::health))
        // shifts
        .route("/api/v1/shifts", post(shifts::create_shift))
        .route("/api/v1/shifts/current", get(shifts::current_shift))
        .route("/api/v1/shifts/closed", get(shifts::closed_shifts))
        .route("/api/v1/shifts/:id", get(shifts::get_shift))
        .route("/api/v1/shifts/:id/roster", patch(shifts::update_roster))
        .route("/api/v1/shifts/:id/close", post(shifts::close_shift))
        .route("/api/v1/shifts/:id/report", post(shifts::backfill_report))
        // archive
        .route("/api/v1/shifts/:id/archive", get(archive::for_shift))
        .route("/api/v1/archive", get(archive::between))
        // records
        .route(
            "/api/v1/shifts/:id/records",
            post(records::create_record).get(records::list_records),
        )
        .route(
            "/api/v1/records/:id",
            get(records::get_record)
                .patch(records::update_record)
                .delete(records::delete_record),
        )
        .route("/api/v1/records/:id/category", post(records::change_category))
        .route("/api/v1/records/:id/history", get(records::history))
        .with_state(state);

    let api = match reports_dir {
        Some(dir) => api.nest_service("/reports", ServeDir::new(dir)),
        None => api,
    };

    api.layer(cors).layer(TraceLayer::new_for_http())
}
