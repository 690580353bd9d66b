//! The cross-platform discover endpoint: one request fans out to every
//! requested platform, each with its own source, and the response reports a
//! per-platform outcome.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::json;
use sourcedb_core::Platform;
use sourcedb_ingest::{
    sources::{InstagramMode, InstagramSource, TiktokSource, TwitterSource, YoutubeSource},
    DiscoverRequest, PlatformOutcome, PlatformSource,
};
use sourcedb_providers::DiscoveryFilters;

use super::{
    map_db_error, parse_platforms, require_keywords, try_apify_client, try_brightdata_client,
    try_twitter_fetcher, ApiError, AppState,
};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverBody {
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub count: Option<usize>,
    pub run_id: Option<String>,
}

pub async fn discover(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<DiscoverBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let platforms = parse_platforms(&req_id.0, &body.platforms)?;
    let keywords = require_keywords(&req_id.0, &body.keywords)?;
    let count = body.count.unwrap_or(20).max(1);

    // Platforms whose provider is not configured still count against the
    // run, but report as failed instead of aborting the rest.
    let mut sources: Vec<Box<dyn PlatformSource>> = Vec::new();
    let mut unavailable: Vec<(Platform, String)> = Vec::new();
    for platform in &platforms {
        match build_source(&state, *platform) {
            Ok(source) => sources.push(source),
            Err(error) => unavailable.push((*platform, error)),
        }
    }

    let request = DiscoverRequest {
        platforms,
        keywords,
        count,
        run_id: body.run_id,
    };
    let refs: Vec<&dyn PlatformSource> = sources.iter().map(AsRef::as_ref).collect();
    let mut outcome = sourcedb_ingest::discover(&state.pool, &refs, &request)
        .await
        .map_err(|sourcedb_ingest::IngestError::Db(e)| {
            map_db_error(req_id.0.clone(), &e)
        })?;

    for (platform, error) in unavailable {
        outcome.outcomes.push(PlatformOutcome::Failed { platform, error });
    }

    let mut per_platform = serde_json::Map::new();
    for result in &outcome.outcomes {
        let (platform, value) = match result {
            PlatformOutcome::Fetched {
                platform, saved, raw, ..
            } => (
                platform,
                json!({ "status": "fetched", "saved": saved, "raw": raw }),
            ),
            PlatformOutcome::Pending { platform, job } => (
                platform,
                json!({ "status": "pending", "snapshotId": job.snapshot_id }),
            ),
            PlatformOutcome::Failed { platform, error } => {
                (platform, json!({ "status": "failed", "error": error }))
            }
        };
        per_platform.insert(platform.as_str().to_owned(), value);
    }

    // This call's posts, still in the order the providers handed them over.
    let items = outcome.posts();

    Ok(Json(json!({
        "runId": outcome.run_id,
        "platforms": per_platform,
        "items": items,
        "totalSaved": outcome.total_saved(),
    })))
}

fn build_source(state: &AppState, platform: Platform) -> Result<Box<dyn PlatformSource>, String> {
    let config = &state.config;
    match platform {
        Platform::Tiktok => {
            let client = try_apify_client(config).map_err(|e| e.to_string())?;
            Ok(Box::new(TiktokSource::new(
                client,
                config.apify_tiktok_actor.clone(),
            )))
        }
        Platform::Instagram => {
            let client = try_apify_client(config).map_err(|e| e.to_string())?;
            Ok(Box::new(InstagramSource::new(
                client,
                config.apify_instagram_actor.clone(),
                config.instagram_session_id.clone(),
                InstagramMode::Hashtag,
            )))
        }
        Platform::Youtube => {
            let client = try_brightdata_client(config).map_err(|e| e.to_string())?;
            Ok(Box::new(YoutubeSource::new(
                client,
                config.youtube_dataset_id.clone(),
                DiscoveryFilters::default(),
            )))
        }
        Platform::Twitter => {
            let fetcher = try_twitter_fetcher(config).map_err(|e| e.to_string())?;
            Ok(Box::new(TwitterSource::new(fetcher, "top".to_string())))
        }
    }
}
