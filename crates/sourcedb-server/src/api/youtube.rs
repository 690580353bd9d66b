//! YouTube endpoints. Collection is asynchronous on the provider side: a
//! trigger registers a local job mapping to the provider snapshot, and the
//! results endpoint polls it by job id, snapshot id, or marketplace request
//! id until items materialize.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sourcedb_core::{Platform, Post};
use sourcedb_ingest::rank_and_slice;
use sourcedb_providers::{
    classify_job_id,
    extract::{pick_count, pick_str, pick_timestamp},
    normalize_youtube, DiscoveryFilters, JobIdKind, SnapshotState,
};

use super::{
    brightdata_client, map_db_error, map_provider_error, posts::platform_latest, require_keywords,
    ApiError, AppState,
};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBody {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub count: Option<usize>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub country: Option<String>,
    pub run_id: Option<String>,
}

pub async fn trigger(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TriggerBody>,
) -> Result<Json<Value>, ApiError> {
    let keywords = require_keywords(&req_id.0, &body.keywords)?;
    let count = body.count.unwrap_or(20).max(1);
    let filters = DiscoveryFilters {
        start_date: body.start_date.unwrap_or_default(),
        end_date: body.end_date.unwrap_or_default(),
        country: body.country.unwrap_or_default(),
    };

    let client = brightdata_client(&state.config, &req_id.0)?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let run_id = sourcedb_db::create_or_merge_run(
        &state.pool,
        body.run_id.as_deref(),
        &[Platform::Youtube],
        &keywords,
        count as i32,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let snapshot_id = client
        .trigger_keyword_discovery(&state.config.youtube_dataset_id, &keywords, count, &filters)
        .await
        .map_err(|e| map_provider_error(req_id.0, &e))?;

    let job_id = state.jobs.insert(keywords, snapshot_id.clone());
    Ok(Json(json!({
        "jobId": job_id,
        "snapshotId": snapshot_id,
        "mode": "async",
        "runId": run_id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsQuery {
    pub job_id: String,
    pub count: Option<usize>,
    pub run_id: Option<String>,
}

pub async fn results(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Value>, ApiError> {
    let count = query.count.unwrap_or(20).max(1);

    // `latest` skips the provider entirely and reads stored rows.
    if query.job_id.eq_ignore_ascii_case("latest") {
        #[allow(clippy::cast_possible_wrap)]
        let items = platform_latest(
            &state,
            &req_id.0,
            Platform::Youtube,
            Some(count as i64),
            query.run_id.as_deref(),
        )
        .await?;
        let raw_count = items.len();
        return Ok(Json(json!({
            "status": "done",
            "items": items,
            "rawCount": raw_count,
            "saved": 0,
            "runId": query.run_id,
        })));
    }

    let client = brightdata_client(&state.config, &req_id.0)?;

    // A local job id resolves to the snapshot the trigger registered;
    // provider ids are usable directly.
    let (snapshot_key, keywords) = match classify_job_id(&query.job_id) {
        JobIdKind::Snapshot | JobIdKind::Request => (query.job_id.clone(), Vec::new()),
        JobIdKind::Local => {
            let entry = state.jobs.get(&query.job_id).ok_or_else(|| {
                ApiError::new(req_id.0.clone(), "not_found", "job not found or expired")
            })?;
            let Some(snapshot_id) = entry.snapshot_id else {
                return Ok(Json(json!({
                    "status": "pending",
                    "message": "collection triggered, snapshot id not assigned yet",
                })));
            };
            (snapshot_id, entry.keywords)
        }
    };

    let items = match classify_job_id(&snapshot_key) {
        JobIdKind::Request => {
            let collection = client
                .resolve_request(&snapshot_key)
                .await
                .map_err(|e| map_provider_error(req_id.0.clone(), &e))?;
            if !collection.is_done() {
                return Ok(Json(json!({
                    "status": "pending",
                    "requestStatus": collection.status,
                })));
            }
            client
                .fetch_view_items(&collection.view_id)
                .await
                .map_err(|e| map_provider_error(req_id.0.clone(), &e))?
        }
        _ => match client
            .fetch_snapshot_polling(&snapshot_key)
            .await
            .map_err(|e| map_provider_error(req_id.0.clone(), &e))?
        {
            SnapshotState::Ready(items) => items,
            SnapshotState::Pending => {
                return Ok(Json(json!({
                    "status": "pending",
                    "snapshotId": snapshot_key,
                })));
            }
        },
    };

    let posts = normalize_youtube(&items, &keywords);
    let raw_count = items.len();
    let sliced = rank_and_slice(posts, count);
    let (run_id, saved) = save_posts(
        &state,
        &req_id.0,
        &sliced,
        query.run_id.as_deref(),
        &keywords,
        count,
    )
    .await?;

    Ok(Json(json!({
        "status": "done",
        "items": sliced,
        "rawCount": raw_count,
        "saved": saved,
        "runId": run_id,
    })))
}

pub async fn snapshots(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<Value>, ApiError> {
    let client = brightdata_client(&state.config, &req_id.0)?;
    let snapshots = client
        .list_snapshots(&state.config.youtube_dataset_id)
        .await
        .map_err(|e| map_provider_error(req_id.0, &e))?;

    let items: Vec<Value> = snapshots
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "created": s.created,
                "status": s.status,
                "datasetId": s.dataset_id,
            })
        })
        .collect();
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotItemsQuery {
    pub count: Option<usize>,
    pub run_id: Option<String>,
    #[serde(default)]
    pub save: bool,
}

pub async fn snapshot_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(snapshot_id): Path<String>,
    Query(query): Query<SnapshotItemsQuery>,
) -> Result<Json<Value>, ApiError> {
    let count = query.count.unwrap_or(20).max(1);
    let client = brightdata_client(&state.config, &req_id.0)?;

    let items = match client
        .fetch_snapshot_polling(&snapshot_id)
        .await
        .map_err(|e| map_provider_error(req_id.0.clone(), &e))?
    {
        SnapshotState::Ready(items) => items,
        SnapshotState::Pending => {
            return Ok(Json(json!({
                "status": "pending",
                "snapshotId": snapshot_id,
            })));
        }
    };

    let posts = normalize_youtube(&items, &[]);
    let raw_count = items.len();
    let sliced = rank_and_slice(posts, count);

    let (run_id, saved) = if query.save {
        let (run_id, saved) = save_posts(
            &state,
            &req_id.0,
            &sliced,
            query.run_id.as_deref(),
            &[],
            count,
        )
        .await?;
        (Some(run_id), saved)
    } else {
        (query.run_id.clone(), 0)
    };

    Ok(Json(json!({
        "items": sliced,
        "rawCount": raw_count,
        "saved": saved,
        "runId": run_id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBody {
    #[serde(default)]
    pub items: Vec<Value>,
    pub run_id: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Persist already-normalized items handed back by a client. Accepts both
/// this API's field names and the legacy `postId`/`desc` variants.
pub async fn save(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SaveBody>,
) -> Result<Json<Value>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "bad_request",
            "items must not be empty",
        ));
    }

    let posts: Vec<Post> = body.items.iter().map(item_to_post).collect();
    let (run_id, saved) = save_posts(
        &state,
        &req_id.0,
        &posts,
        body.run_id.as_deref(),
        &body.keywords,
        posts.len().max(1),
    )
    .await?;

    Ok(Json(json!({ "ok": true, "saved": saved, "runId": run_id })))
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
) -> Result<Json<Value>, ApiError> {
    let items = platform_latest(
        &state,
        &req_id.0,
        Platform::Youtube,
        query.count,
        query.run_id.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "items": items })))
}

async fn save_posts(
    state: &AppState,
    request_id: &str,
    posts: &[Post],
    run_id: Option<&str>,
    keywords: &[String],
    count: usize,
) -> Result<(String, i64), ApiError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let run_id = sourcedb_db::create_or_merge_run(
        &state.pool,
        run_id,
        &[Platform::Youtube],
        keywords,
        count.max(1) as i32,
    )
    .await
    .map_err(|e| map_db_error(request_id.to_owned(), &e))?;

    let saved = sourcedb_db::upsert_posts(&state.pool, Platform::Youtube, posts, &run_id)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?;
    Ok((run_id, saved))
}

fn item_to_post(item: &Value) -> Post {
    let mut post = Post::empty(Platform::Youtube);
    post.id = pick_str(item, &["id", "postId", "post_id"]);
    post.keyword = pick_str(item, &["keyword"]);
    post.author = pick_str(item, &["author"]);
    post.url = pick_str(item, &["url"]);
    post.title = pick_str(item, &["title"]);
    post.description = pick_str(item, &["description", "desc"]);
    post.published_at = pick_timestamp(item, &["published_at", "publishedAt", "date_posted"]);
    post.likes = pick_count(item, &["likes"]);
    post.comments = pick_count(item, &["comments"]);
    post.shares = pick_count(item, &["shares"]);
    post.views = pick_count(item, &["views"]);
    post.followers = pick_count(item, &["followers"]);
    post.raw_data = item.clone();
    post
}
