// Content submission and tagging handlers.
//
// POST /api/content             - submit text, wait for the decision
// GET  /api/content/{id}        - stored content item with tags
// GET  /api/content/{id}/tags   - tags only
// POST /api/content/{id}/tags   - attach a tag (idempotent by name)

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::db::models::Tag;
use crate::web::{bad_body, engine_error, AppState};

#[derive(Deserialize)]
pub struct SubmitBody {
    pub text: String,
    pub author: String,
    /// Agent ids to ask; the configured defaults when absent
    pub agents: Option<Vec<String>>,
}

pub async fn submit_content(
    State(state): State<AppState>,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let handle = match state
        .engine
        .submit_with_agents(&body.text, &body.author, body.agents)
        .await
    {
        Ok(handle) => handle,
        Err(e) => return engine_error(e),
    };

    match handle.wait().await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => engine_error(e),
    }
}

pub async fn get_content(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.get_content(&id).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => engine_error(e),
    }
}

pub async fn list_tags(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.get_tags(&id).await {
        Ok(tags) => Json(tags).into_response(),
        Err(e) => engine_error(e),
    }
}

pub async fn attach_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Tag>, JsonRejection>,
) -> Response {
    let Json(tag) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let attached = match state.engine.attach_tag(&id, &tag).await {
        Ok(attached) => attached,
        Err(e) => return engine_error(e),
    };
    match state.engine.get_tags(&id).await {
        Ok(tags) => Json(serde_json::json!({ "attached": attached, "tags": tags })).into_response(),
        Err(e) => engine_error(e),
    }
}
