//! Twitter trigger endpoint. Collection runs through the local fetch script,
//! so results come back within the request like TikTok's.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::json;
use sourcedb_core::Platform;
use sourcedb_providers::normalize_twitter;

use super::{
    map_db_error, map_provider_error, persist_budgeted, require_keywords, twitter_fetcher,
    ApiError, AppState,
};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBody {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub count: Option<usize>,
    /// Search tab to pull from, `top` or `latest`.
    pub mode: Option<String>,
    pub run_id: Option<String>,
}

pub async fn trigger(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TriggerBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keywords = require_keywords(&req_id.0, &body.keywords)?;
    let count = body.count.unwrap_or(20).max(1);
    let mode = body.mode.unwrap_or_else(|| "top".to_string());

    let fetcher = twitter_fetcher(&state.config, &req_id.0)?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let run_id = sourcedb_db::create_or_merge_run(
        &state.pool,
        body.run_id.as_deref(),
        &[Platform::Twitter],
        &keywords,
        count as i32,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let raw = fetcher
        .fetch(&keywords, count, &mode)
        .await
        .map_err(|e| map_provider_error(req_id.0.clone(), &e))?;
    let posts = normalize_twitter(&raw);
    let raw_count = raw.len();

    let (items, saved, _) = persist_budgeted(
        &state.pool,
        &req_id.0,
        Platform::Twitter,
        posts,
        count * keywords.len().max(1),
        &run_id,
    )
    .await?;
    Ok(Json(json!({
        "items": items,
        "rawCount": raw_count,
        "saved": saved,
        "runId": run_id,
    })))
}
