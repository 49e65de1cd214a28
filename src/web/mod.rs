// Web server: Axum-based JSON API over the engine's boundary operations.
//
// Every /api/* route serves JSON. Engine errors map onto HTTP status codes
// in one place (`engine_error`) so handlers can just use `?`-style matches.

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::engine::Engine;
use crate::error::EngineError;

pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(engine: Engine, port: u16, bind: &str) -> Result<()> {
    let app = build_router(AppState { engine });

    let addr = format!("{bind}:{port}");
    info!("verdict API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/status", get(handlers::status::get_status))
        .route(
            "/api/rules",
            get(handlers::rules::list_rules).put(handlers::rules::upsert_rule),
        )
        .route("/api/rules/replace", post(handlers::rules::replace_rules))
        .route("/api/rules/{id}", delete(handlers::rules::remove_rule))
        .route("/api/content", post(handlers::content::submit_content))
        .route("/api/content/{id}", get(handlers::content::get_content))
        .route(
            "/api/content/{id}/tags",
            get(handlers::content::list_tags).post(handlers::content::attach_tag),
        )
        .route("/api/history", get(handlers::history::list_history))
        .route("/api/history/{id}", get(handlers::history::get_record));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check. Always returns 200 OK.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}

/// A request body that isn't the expected JSON shape is a client error (400),
/// kept apart from the 422 the engine returns for a well-formed but invalid
/// rule or content item.
pub fn bad_body(rejection: JsonRejection) -> Response {
    api_error(
        StatusCode::BAD_REQUEST,
        &format!("invalid body: {}", rejection.body_text()),
    )
}

/// Status code for an engine error.
pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation(_) | EngineError::NoData => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::InvariantViolation { .. } | EngineError::Cancelled => StatusCode::CONFLICT,
        EngineError::AgentUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an engine error into a JSON error response. Storage details
/// are logged, not returned.
pub fn engine_error(err: EngineError) -> Response {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "Request failed");
        return api_error(status, "internal storage error");
    }
    api_error(status, &err.to_string())
}
