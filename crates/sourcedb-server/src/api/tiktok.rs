//! TikTok endpoints: a synchronous trigger (actor runs complete within the
//! request) and a latest feed over stored rows.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use sourcedb_core::Platform;
use sourcedb_ingest::{sources::TiktokSource, PlatformSource};

use super::{
    apify_client, map_db_error, map_provider_error, persist_budgeted, posts::platform_latest,
    require_keywords, ApiError, AppState,
};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBody {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub count: Option<usize>,
    pub run_id: Option<String>,
}

pub async fn instant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TriggerBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keywords = require_keywords(&req_id.0, &body.keywords)?;
    let count = body.count.unwrap_or(20).max(1);

    let client = apify_client(&state.config, &req_id.0)?;
    let source = TiktokSource::new(client, state.config.apify_tiktok_actor.clone());

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let run_id = sourcedb_db::create_or_merge_run(
        &state.pool,
        body.run_id.as_deref(),
        &[Platform::Tiktok],
        &keywords,
        count as i32,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let batch = source
        .fetch(&keywords, count)
        .await
        .map_err(|e| map_provider_error(req_id.0.clone(), &e))?;

    let (items, saved, raw_count) = persist_budgeted(
        &state.pool,
        &req_id.0,
        Platform::Tiktok,
        batch.posts,
        count,
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuery {
    pub count: Option<i64>,
    pub run_id: Option<String>,
}

pub async fn latest(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let items = platform_latest(
        &state,
        &req_id.0,
        Platform::Tiktok,
        query.count,
        query.run_id.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "items": items })))
}
