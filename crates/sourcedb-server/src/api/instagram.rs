//! Instagram search endpoint. Keywords are hashtags by default; profile mode
//! treats them as handles or profile URLs instead.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::json;
use sourcedb_core::Platform;
use sourcedb_ingest::{
    sources::{InstagramMode, InstagramSource},
    PlatformSource,
};

use super::{
    apify_client, map_db_error, map_provider_error, persist_budgeted, require_keywords, ApiError,
    AppState,
};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    #[serde(default)]
    pub keywords: Vec<String>,
    /// `hashtag` (default) or `profile`.
    #[serde(rename = "type")]
    pub search_type: Option<String>,
    pub limit: Option<usize>,
    pub run_id: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SearchBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keywords = require_keywords(&req_id.0, &body.keywords)?;
    let limit = body.limit.unwrap_or(20).max(1);
    let mode = match body.search_type.as_deref() {
        None | Some("hashtag") => InstagramMode::Hashtag,
        Some("profile") => InstagramMode::Profile,
        Some(other) => {
            return Err(ApiError::new(
                req_id.0,
                "bad_request",
                format!("unknown search type: {other}"),
            ))
        }
    };

    let client = apify_client(&state.config, &req_id.0)?;
    let source = InstagramSource::new(
        client,
        state.config.apify_instagram_actor.clone(),
        state.config.instagram_session_id.clone(),
        mode,
    );

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let run_id = sourcedb_db::create_or_merge_run(
        &state.pool,
        body.run_id.as_deref(),
        &[Platform::Instagram],
        &keywords,
        limit as i32,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let batch = source
        .fetch(&keywords, limit)
        .await
        .map_err(|e| map_provider_error(req_id.0.clone(), &e))?;

    let (items, saved, raw_count) = persist_budgeted(
        &state.pool,
        &req_id.0,
        Platform::Instagram,
        batch.posts,
        limit * keywords.len().max(1),
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
