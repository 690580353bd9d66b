//! Request plumbing shared by every route: request ids, bearer-key auth for
//! the sourcing surface, and a per-caller request cap. A sourcing trigger
//! starts real scraper jobs upstream, so the cap is tracked per bearer key
//! rather than as one shared counter.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

// Window maps larger than this get swept of expired entries before insert,
// keeping churning anonymous keys from growing the map without bound.
const WINDOW_SWEEP_THRESHOLD: usize = 64;

/// Request id carried through extensions and echoed in `x-request-id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Honors an incoming `x-request-id` header, otherwise mints a `UUIDv4`.
/// The id rides request extensions as [`RequestId`] and is set on the
/// response so callers can correlate logs.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}

/// The set of bearer keys allowed onto `/api/sourcing/*`.
///
/// An empty set means auth is off, which is only permitted in development;
/// anywhere else startup fails rather than serving the scrape triggers open.
#[derive(Debug, Clone)]
pub struct AuthState {
    keys: Arc<HashSet<String>>,
}

impl AuthState {
    /// Reads `SOURCEDB_API_KEYS` (comma-separated bearer keys).
    ///
    /// # Errors
    ///
    /// Fails when no usable key is configured outside development.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        Self::from_keys(
            &std::env::var("SOURCEDB_API_KEYS").unwrap_or_default(),
            is_development,
        )
    }

    fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if !is_development {
                anyhow::bail!(
                    "SOURCEDB_API_KEYS is required outside development; \
                     provide comma-separated bearer keys"
                );
            }
            tracing::warn!("SOURCEDB_API_KEYS not set; sourcing routes are open in development");
        }

        Ok(Self {
            keys: Arc::new(keys),
        })
    }

    fn enabled(&self) -> bool {
        !self.keys.is_empty()
    }
}

/// Rejects sourcing requests without a configured bearer key.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled() {
        return next.run(req).await;
    }
    let authorized = matches!(bearer_key(&req), Some(key) if auth.keys.contains(key));
    if authorized {
        next.run(req).await
    } else {
        reject(
            &req,
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer key",
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: Instant,
    hits: usize,
}

/// Fixed-window request cap with one window per caller, so a chatty
/// integration exhausting its own budget cannot starve the others.
/// Callers are told apart by bearer key; unauthenticated development
/// traffic shares a single window.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_hits: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_hits: usize, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn try_admit(&self, caller: &str) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        if windows.len() > WINDOW_SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.opened_at) < self.window);
        }

        let window = windows.entry(caller.to_owned()).or_insert(Window {
            opened_at: now,
            hits: 0,
        });
        if now.duration_since(window.opened_at) >= self.window {
            window.opened_at = now;
            window.hits = 0;
        }
        if window.hits >= self.max_hits {
            return false;
        }
        window.hits += 1;
        true
    }
}

/// Applies the caller's fixed-window cap before the request reaches a route.
pub async fn enforce_rate_limit(
    State(limiter): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let caller = bearer_key(&req).unwrap_or("shared").to_owned();
    if limiter.try_admit(&caller).await {
        next.run(req).await
    } else {
        reject(
            &req,
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "request cap reached for this key, retry next window",
        )
    }
}

fn bearer_key(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

// Rejections use the same envelope the handlers emit, request id included,
// so a 401/429 is indistinguishable in shape from any other API error.
fn reject(req: &Request, status: StatusCode, code: &str, message: &str) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map_or("unknown", |id| id.0.as_str());
    (
        status,
        Json(json!({
            "error": { "code": code, "message": message },
            "meta": { "request_id": request_id, "timestamp": Utc::now() },
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: Option<&str>) -> Request {
        let builder = axum::http::Request::builder().uri("/api/sourcing/posts");
        let builder = match value {
            Some(v) => builder.header(AUTHORIZATION, v),
            None => builder,
        };
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_key_parses_well_formed_header() {
        let req = request_with_auth(Some("Bearer key-1"));
        assert_eq!(bearer_key(&req), Some("key-1"));
    }

    #[test]
    fn bearer_key_rejects_other_schemes_and_blanks() {
        assert_eq!(bearer_key(&request_with_auth(Some("Basic abc"))), None);
        assert_eq!(bearer_key(&request_with_auth(Some("Bearer   "))), None);
        assert_eq!(bearer_key(&request_with_auth(None)), None);
    }

    #[test]
    fn auth_keys_are_trimmed_and_blanks_dropped() {
        let auth = AuthState::from_keys(" key-1 , ,key-2", false).unwrap();
        assert!(auth.enabled());
        assert!(auth.keys.contains("key-1"));
        assert!(auth.keys.contains("key-2"));
        assert_eq!(auth.keys.len(), 2);
    }

    #[test]
    fn missing_keys_disable_auth_only_in_development() {
        let auth = AuthState::from_keys("", true).unwrap();
        assert!(!auth.enabled());
        assert!(AuthState::from_keys("", false).is_err());
    }

    #[tokio::test]
    async fn rate_windows_are_tracked_per_caller() {
        let limiter = RateLimitState::new(2, Duration::from_secs(60));
        assert!(limiter.try_admit("key-1").await);
        assert!(limiter.try_admit("key-1").await);
        assert!(!limiter.try_admit("key-1").await, "key-1 is out of budget");
        assert!(limiter.try_admit("key-2").await, "key-2 has its own window");
    }

    #[tokio::test]
    async fn expired_window_resets_the_budget() {
        let limiter = RateLimitState::new(1, Duration::ZERO);
        assert!(limiter.try_admit("key-1").await);
        assert!(limiter.try_admit("key-1").await, "a zero-length window always restarts");
    }
}
