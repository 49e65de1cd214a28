// History handlers.
//
// GET /api/history        - ?author= ?tier= ?content_id= ?since= ?until=
//                          ?order=oldest_first ?limit= (default 50, max 500)
// GET /api/history/{id}   - one record

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::db::models::{parse_timestamp, ActionTier, HistoryFilter, HistoryOrder};
use crate::web::{api_error, engine_error, AppState};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Deserialize, Default)]
pub struct HistoryParams {
    pub author: Option<String>,
    /// RETAIN | REVIEW | ESCALATE, any case
    pub tier: Option<String>,
    pub content_id: Option<String>,
    /// RFC 3339, inclusive
    pub since: Option<String>,
    /// RFC 3339, exclusive
    pub until: Option<String>,
    /// newest_first (default) | oldest_first
    pub order: Option<HistoryOrder>,
    pub limit: Option<usize>,
}

impl HistoryParams {
    fn to_filter(&self) -> Result<HistoryFilter, String> {
        let tier = match &self.tier {
            Some(raw) => Some(raw.parse::<ActionTier>().map_err(|e| e.to_string())?),
            None => None,
        };
        let since = match &self.since {
            Some(raw) => Some(parse_timestamp(raw).map_err(|e| format!("invalid since: {e}"))?),
            None => None,
        };
        let until = match &self.until {
            Some(raw) => Some(parse_timestamp(raw).map_err(|e| format!("invalid until: {e}"))?),
            None => None,
        };
        Ok(HistoryFilter {
            author_ref: self.author.clone(),
            tier,
            content_id: self.content_id.clone(),
            since,
            until,
            order: self.order.unwrap_or_default(),
        })
    }
}

pub async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let filter = match params.to_filter() {
        Ok(filter) => filter,
        Err(msg) => return api_error(StatusCode::BAD_REQUEST, &msg),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match state.engine.get_history(filter, Some(limit)).await {
        Ok(records) => Json(serde_json::json!({
            "records": records,
            "count": records.len(),
            "limit": limit,
        }))
        .into_response(),
        Err(e) => engine_error(e),
    }
}

pub async fn get_record(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.get_record(&id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => engine_error(e),
    }
}
