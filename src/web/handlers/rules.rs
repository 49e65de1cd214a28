// Rule administration handlers.
//
// GET    /api/rules           - active rule set with its revision
// PUT    /api/rules           - insert or update one rule
// POST   /api/rules/replace   - replace the whole set atomically
// DELETE /api/rules/{id}      - remove a rule, optionally with replacements
//
// Every mutation answers with the resulting rule set, so the caller sees
// the new revision without a second request.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::models::ScoringRule;
use crate::rules::RuleSet;
use crate::web::{api_error, bad_body, engine_error, AppState};

#[derive(Serialize)]
pub struct RuleSetBody {
    pub revision: u64,
    pub rules: Vec<ScoringRule>,
}

impl From<RuleSet> for RuleSetBody {
    fn from(set: RuleSet) -> Self {
        Self {
            revision: set.revision(),
            rules: set.rules().to_vec(),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct RemoveRuleBody {
    #[serde(default)]
    pub replacements: Vec<ScoringRule>,
}

pub async fn list_rules(State(state): State<AppState>) -> Json<RuleSetBody> {
    Json(state.engine.rule_set().await.into())
}

pub async fn upsert_rule(
    State(state): State<AppState>,
    body: Result<Json<ScoringRule>, JsonRejection>,
) -> Response {
    let Json(rule) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.engine.upsert_rule(rule).await {
        Ok(set) => Json(RuleSetBody::from(set)).into_response(),
        Err(e) => engine_error(e),
    }
}

pub async fn replace_rules(
    State(state): State<AppState>,
    body: Result<Json<Vec<ScoringRule>>, JsonRejection>,
) -> Response {
    let Json(rules) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.engine.replace_rules(rules).await {
        Ok(set) => Json(RuleSetBody::from(set)).into_response(),
        Err(e) => engine_error(e),
    }
}

/// The body is optional; an empty body means no replacements.
pub async fn remove_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let body: RemoveRuleBody = if body.is_empty() {
        RemoveRuleBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(e) => return api_error(StatusCode::BAD_REQUEST, &format!("invalid body: {e}")),
        }
    };

    match state.engine.remove_rule(&id, body.replacements).await {
        Ok(set) => Json(RuleSetBody::from(set)).into_response(),
        Err(e) => engine_error(e),
    }
}
