//! Run-registry endpoints: register/merge, list, and cascade-delete runs.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{clamp_limit, map_db_error, parse_platforms, ApiError, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunBody {
    pub id: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub count: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CreateRunResponse {
    pub ok: bool,
    pub id: String,
}

pub async fn create_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateRunBody>,
) -> Result<Json<CreateRunResponse>, ApiError> {
    let platforms = parse_platforms(&req_id.0, &body.platforms)?;
    let count = body.count.unwrap_or(20).max(1);

    let id = sourcedb_db::create_or_merge_run(
        &state.pool,
        body.id.as_deref(),
        &platforms,
        &body.keywords,
        count,
    )
    .await
    .map_err(|e| map_db_error(req_id.0, &e))?;

    Ok(Json(CreateRunResponse { ok: true, id }))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RunItem {
    pub id: String,
    pub platforms: Vec<String>,
    pub keywords: Vec<String>,
    pub count: i32,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub items: Vec<RunItem>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ListRunsResponse>, ApiError> {
    let limit = clamp_limit(query.limit, 50, 200);
    let rows = sourcedb_db::list_runs(&state.pool, limit)
        .await
        .map_err(|e| map_db_error(req_id.0, &e))?;

    let items = rows
        .into_iter()
        .map(|row| RunItem {
            platforms: row.platform_list().into_iter().map(String::from).collect(),
            keywords: row.keyword_list().into_iter().map(String::from).collect(),
            id: row.id,
            count: row.count,
            started_at: row.started_at,
        })
        .collect();

    Ok(Json(ListRunsResponse { items }))
}

#[derive(Debug, Serialize)]
pub struct DeletedBreakdown {
    pub runs: u64,
    pub tiktok: u64,
    pub youtube: u64,
    pub twitter: u64,
    pub instagram: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteRunResponse {
    pub success: bool,
    pub deleted: DeletedBreakdown,
}

pub async fn delete_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<String>,
) -> Result<Json<DeleteRunResponse>, ApiError> {
    let counts = sourcedb_db::delete_run(&state.pool, &run_id)
        .await
        .map_err(|e| map_db_error(req_id.0, &e))?;

    Ok(Json(DeleteRunResponse {
        success: true,
        deleted: DeletedBreakdown {
            runs: 1,
            tiktok: counts.tiktok,
            youtube: counts.youtube,
            twitter: counts.twitter,
            instagram: counts.instagram,
            total: counts.total(),
        },
    }))
}
