mod discover;
mod instagram;
mod posts;
mod runs;
mod tiktok;
mod twitter;
mod youtube;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sourcedb_core::AppConfig;
use sourcedb_providers::{ApifyClient, BrightDataClient, ProviderError, TwitterFetcher};
use sqlx::PgPool;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::jobs::JobStore;
use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jobs: JobStore,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &sourcedb_db::DbError) -> ApiError {
    if matches!(error, sourcedb_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_provider_error(request_id: String, error: &ProviderError) -> ApiError {
    match error {
        ProviderError::MissingConfig(var) => ApiError::new(
            request_id,
            "missing_config",
            format!("missing provider configuration: {var}"),
        ),
        ProviderError::Api { .. } | ProviderError::Http(_) | ProviderError::RunFailed { .. } => {
            tracing::warn!(error = %error, "provider call failed");
            ApiError::new(request_id, "bad_gateway", error.to_string())
        }
        ProviderError::Subprocess(_) | ProviderError::Deserialize { .. } => {
            tracing::error!(error = %error, "provider pipeline failed");
            ApiError::new(request_id, "internal_error", error.to_string())
        }
    }
}

pub(super) fn try_apify_client(config: &AppConfig) -> Result<ApifyClient, ProviderError> {
    let token = config
        .apify_token
        .as_deref()
        .ok_or(ProviderError::MissingConfig("APIFY_TOKEN"))?;
    ApifyClient::new(
        token,
        config.provider_request_timeout_secs,
        config.provider_poll_max_attempts,
        config.provider_poll_delay_secs,
    )
}

pub(super) fn try_brightdata_client(
    config: &AppConfig,
) -> Result<BrightDataClient, ProviderError> {
    let key = config
        .bright_data_api_key
        .as_deref()
        .ok_or(ProviderError::MissingConfig("BRIGHT_DATA_API_KEY"))?;
    BrightDataClient::new(
        key,
        config.provider_request_timeout_secs,
        config.provider_poll_max_attempts,
        config.provider_poll_delay_secs,
    )
}

pub(super) fn try_twitter_fetcher(config: &AppConfig) -> Result<TwitterFetcher, ProviderError> {
    TwitterFetcher::new(
        &config.python_bin,
        &config.twitter_script,
        config.twitter_auth_token.as_deref(),
        config.twitter_ct0.as_deref(),
    )
}

pub(super) fn apify_client(
    config: &AppConfig,
    request_id: &str,
) -> Result<ApifyClient, ApiError> {
    try_apify_client(config).map_err(|e| map_provider_error(request_id.to_owned(), &e))
}

pub(super) fn brightdata_client(
    config: &AppConfig,
    request_id: &str,
) -> Result<BrightDataClient, ApiError> {
    try_brightdata_client(config).map_err(|e| map_provider_error(request_id.to_owned(), &e))
}

pub(super) fn twitter_fetcher(
    config: &AppConfig,
    request_id: &str,
) -> Result<TwitterFetcher, ApiError> {
    try_twitter_fetcher(config).map_err(|e| map_provider_error(request_id.to_owned(), &e))
}

/// Parses platform names from a request body, rejecting unknown values.
pub(super) fn parse_platforms(
    request_id: &str,
    raw: &[String],
) -> Result<Vec<sourcedb_core::Platform>, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::new(
            request_id,
            "bad_request",
            "at least one platform is required",
        ));
    }
    raw.iter()
        .map(|s| {
            sourcedb_core::Platform::parse(s).map_err(|e| {
                ApiError::new(request_id, "bad_request", e.to_string())
            })
        })
        .collect()
}

/// Keywords with blanks dropped; errors when nothing usable remains.
pub(super) fn require_keywords(
    request_id: &str,
    raw: &[String],
) -> Result<Vec<String>, ApiError> {
    let keywords: Vec<String> = raw
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Err(ApiError::new(
            request_id,
            "bad_request",
            "at least one non-empty keyword is required",
        ));
    }
    Ok(keywords)
}

pub(super) fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

/// Persists a provider batch under a run, keeping only the first `budget`
/// posts so the store never holds more of a run than the request asked for.
/// Returns the persisted slice, the upsert tally, and the pre-slice size.
pub(super) async fn persist_budgeted(
    pool: &PgPool,
    request_id: &str,
    platform: sourcedb_core::Platform,
    posts: Vec<sourcedb_core::Post>,
    budget: usize,
    run_id: &str,
) -> Result<(Vec<sourcedb_core::Post>, i64, usize), ApiError> {
    let raw_count = posts.len();
    let items = sourcedb_ingest::rank_and_slice(posts, budget);
    let saved = sourcedb_db::upsert_posts(pool, platform, &items, run_id)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?;
    Ok((items, saved, raw_count))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/sourcing/discover", post(discover::discover))
        .route(
            "/api/sourcing/runs",
            get(runs::list_runs).post(runs::create_run),
        )
        .route("/api/sourcing/runs/{run_id}", delete(runs::delete_run))
        .route("/api/sourcing/posts", get(posts::list_posts))
        .route("/api/sourcing/latest", get(posts::latest_posts))
        .route("/api/sourcing/tiktok/instant", post(tiktok::instant))
        .route("/api/sourcing/tiktok/latest", get(tiktok::latest))
        .route("/api/sourcing/youtube/trigger", post(youtube::trigger))
        .route("/api/sourcing/youtube/results", get(youtube::results))
        .route("/api/sourcing/youtube/snapshots", get(youtube::snapshots))
        .route(
            "/api/sourcing/youtube/snapshots/{snapshot_id}/items",
            get(youtube::snapshot_items),
        )
        .route("/api/sourcing/youtube/save", post(youtube::save))
        .route("/api/sourcing/youtube/latest", get(youtube::latest))
        .route("/api/sourcing/twitter/trigger", post(twitter::trigger))
        .route("/api/sourcing/instagram/search", post(instagram::search))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    database: &'static str,
    active_jobs: usize,
    timestamp: DateTime<Utc>,
    request_id: String,
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match sourcedb_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok",
                database: "ok",
                active_jobs: state.jobs.len(),
                timestamp: Utc::now(),
                request_id: req_id.0,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody {
                    status: "degraded",
                    database: "unavailable",
                    active_jobs: state.jobs.len(),
                    timestamp: Utc::now(),
                    request_id: req_id.0,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            database_url: "postgres://unused/db".to_string(),
            env: sourcedb_core::Environment::Test,
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            log_level: "info".to_string(),
            apify_token: None,
            apify_tiktok_actor: "actor-tt".to_string(),
            apify_instagram_actor: "actor-ig".to_string(),
            bright_data_api_key: None,
            youtube_dataset_id: "gd_test".to_string(),
            instagram_session_id: None,
            twitter_auth_token: None,
            twitter_ct0: None,
            twitter_script: std::path::PathBuf::from("./scripts/twitter_fetch.py"),
            python_bin: "python3".to_string(),
            db_max_connections: 5,
            db_min_connections: 1,
            db_acquire_timeout_secs: 5,
            provider_request_timeout_secs: 5,
            provider_poll_max_attempts: 1,
            provider_poll_delay_secs: 0,
        })
    }

    fn test_app(pool: sqlx::PgPool) -> Router {
        let auth = AuthState::from_env(true).expect("auth");
        build_app(
            AppState {
                pool,
                config: test_config(),
                jobs: JobStore::default(),
            },
            auth,
            default_rate_limit_state(),
        )
    }

    #[test]
    fn api_error_codes_map_to_statuses() {
        let cases = [
            ("not_found", StatusCode::NOT_FOUND),
            ("bad_request", StatusCode::BAD_REQUEST),
            ("bad_gateway", StatusCode::BAD_GATEWAY),
            ("missing_config", StatusCode::INTERNAL_SERVER_ERROR),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, expected) in cases {
            let response = ApiError::new("req-1", code, "message").into_response();
            assert_eq!(response.status(), expected, "code {code}");
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_reports_ok_with_live_database(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], "ok");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_then_list_runs_roundtrip(pool: sqlx::PgPool) {
        let app = test_app(pool);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sourcing/runs")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"id":"run-http","platforms":["tiktok","youtube"],"keywords":["rust"],"count":20}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["ok"], true);
        assert_eq!(json["id"], "run-http");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sourcing/runs?limit=10")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        let items = json["items"].as_array().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "run-http");
        assert_eq!(items[0]["platforms"], serde_json::json!(["tiktok", "youtube"]));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_run_rejects_unknown_platform(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sourcing/runs")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"platforms":["myspace"],"keywords":[],"count":20}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn delete_unknown_run_is_404(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/sourcing/runs/no-such-run")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn delete_run_reports_per_platform_counts(pool: sqlx::PgPool) {
        sourcedb_db::create_or_merge_run(
            &pool,
            Some("run-del"),
            &[sourcedb_core::Platform::Tiktok],
            &["rust".to_string()],
            10,
        )
        .await
        .expect("create run");
        let mut post = sourcedb_core::Post::empty(sourcedb_core::Platform::Tiktok);
        post.id = "tt-1".to_string();
        sourcedb_db::upsert_posts(&pool, sourcedb_core::Platform::Tiktok, &[post], "run-del")
            .await
            .expect("seed post");

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/sourcing/runs/run-del")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["success"], true);
        assert_eq!(json["deleted"]["tiktok"], 1);
        assert_eq!(json["deleted"]["total"], 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn posts_pagination_shape(pool: sqlx::PgPool) {
        for i in 0..3 {
            let mut post = sourcedb_core::Post::empty(sourcedb_core::Platform::Twitter);
            post.id = format!("tw-{i}");
            sourcedb_db::upsert_posts(&pool, sourcedb_core::Platform::Twitter, &[post], "run-a")
                .await
                .expect("seed");
        }

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/sourcing/posts?platform=all&page=1&pageSize=2")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["total"], 3);
        assert_eq!(json["page"], 1);
        assert_eq!(json["pageSize"], 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn posts_rejects_unknown_platform(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/sourcing/posts?platform=myspace")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn latest_filters_by_platform_and_run(pool: sqlx::PgPool) {
        let mut post = sourcedb_core::Post::empty(sourcedb_core::Platform::Youtube);
        post.id = "yt-1".to_string();
        sourcedb_db::upsert_posts(&pool, sourcedb_core::Platform::Youtube, &[post], "run-a")
            .await
            .expect("seed");

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/sourcing/latest?platform=youtube&runId=run-a")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["count"], 1);
        assert_eq!(json["items"][0]["id"], "yt-1");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn tiktok_instant_without_token_is_config_error(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sourcing/tiktok/instant")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"keywords":["rust"],"count":5}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["error"]["code"], "missing_config");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn persist_budgeted_caps_what_the_store_keeps(pool: sqlx::PgPool) {
        let run_id = sourcedb_db::create_or_merge_run(
            &pool,
            Some("1-tiktok"),
            &[sourcedb_core::Platform::Tiktok],
            &["rust".to_string()],
            2,
        )
        .await
        .expect("run");

        let posts: Vec<sourcedb_core::Post> = (0..5)
            .map(|i| {
                let mut post = sourcedb_core::Post::empty(sourcedb_core::Platform::Tiktok);
                post.id = format!("tt-{i}");
                post
            })
            .collect();

        let (items, saved, raw_count) = persist_budgeted(
            &pool,
            "req-1",
            sourcedb_core::Platform::Tiktok,
            posts,
            2,
            &run_id,
        )
        .await
        .expect("persist");

        assert_eq!(raw_count, 5);
        assert_eq!(saved, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "tt-0", "slicing must not reorder");

        let stored = sourcedb_db::count_posts(
            &pool,
            sourcedb_db::PlatformFilter::One(sourcedb_core::Platform::Tiktok),
            None,
        )
        .await
        .expect("count");
        assert_eq!(stored, 2, "only the budgeted slice reaches the store");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn twitter_trigger_requires_keywords(pool: sqlx::PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sourcing/twitter/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"keywords":[],"count":5}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
