//! Read endpoints over the post store: paginated queries and a latest feed,
//! both spanning all platforms or narrowed to one.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use sourcedb_core::Platform;
use sourcedb_db::{PlatformFilter, PostRow};

use super::{clamp_limit, map_db_error, ApiError, AppState};
use crate::middleware::RequestId;

fn parse_filter(request_id: &str, raw: Option<&str>) -> Result<PlatformFilter, ApiError> {
    match raw {
        None | Some("all") | Some("") => Ok(PlatformFilter::All),
        Some(name) => Platform::parse(name)
            .map(PlatformFilter::One)
            .map_err(|e| ApiError::new(request_id, "bad_request", e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsQuery {
    pub platform: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsResponse {
    pub items: Vec<PostRow>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListPostsResponse>, ApiError> {
    let filter = parse_filter(&req_id.0, query.platform.as_deref())?;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = clamp_limit(query.page_size, 20, 100);
    let offset = (page - 1) * page_size;
    let run_id = query.run_id.as_deref();

    let items = sourcedb_db::query_posts(&state.pool, filter, run_id, page_size, offset)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let total = sourcedb_db::count_posts(&state.pool, filter, run_id)
        .await
        .map_err(|e| map_db_error(req_id.0, &e))?;

    Ok(Json(ListPostsResponse {
        items,
        total,
        page,
        page_size,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuery {
    pub platform: Option<String>,
    pub count: Option<i64>,
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub items: Vec<PostRow>,
    pub count: usize,
}

pub async fn latest_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<LatestResponse>, ApiError> {
    let filter = parse_filter(&req_id.0, query.platform.as_deref())?;
    let limit = clamp_limit(query.count, 50, 500);

    let items =
        sourcedb_db::query_posts(&state.pool, filter, query.run_id.as_deref(), limit, 0)
            .await
            .map_err(|e| map_db_error(req_id.0, &e))?;

    Ok(Json(LatestResponse {
        count: items.len(),
        items,
    }))
}

/// Latest feed narrowed to one platform, used by the per-platform routes.
pub(super) async fn platform_latest(
    state: &AppState,
    request_id: &str,
    platform: Platform,
    count: Option<i64>,
    run_id: Option<&str>,
) -> Result<Vec<PostRow>, ApiError> {
    let limit = clamp_limit(count, 50, 500);
    sourcedb_db::query_posts(
        &state.pool,
        PlatformFilter::One(platform),
        run_id,
        limit,
        0,
    )
    .await
    .map_err(|e| map_db_error(request_id.to_owned(), &e))
}
