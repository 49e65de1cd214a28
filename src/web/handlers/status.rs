// GET /api/status: rule revision, per-tier decision counts, spool depth.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::status;
use crate::web::{api_error, AppState};

pub async fn get_status(State(state): State<AppState>) -> Response {
    match status::collect(&state.engine).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to collect status");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to collect status")
        }
    }
}
