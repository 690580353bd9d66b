//! HTTP client for the Bright Data datasets API.
//!
//! YouTube sourcing is asynchronous: a keyword-discovery trigger returns a
//! snapshot id, and the snapshot materializes over the next minutes. The
//! client models the two id families the API hands out:
//!
//! - `s_…` snapshot ids read directly from the v3 snapshot endpoint, where
//!   HTTP 202 means "still collecting";
//! - `j_…` marketplace request ids resolved through `request_collection`
//!   into a `view_id`, whose items live behind the view endpoints.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ProviderError;
use crate::retry::retry_with_backoff;

const DEFAULT_BASE_URL: &str = "https://api.brightdata.com/";

/// Outcome of reading a snapshot that may still be materializing.
#[derive(Debug)]
pub enum SnapshotState {
    Ready(Vec<Value>),
    Pending,
}

/// Resolved state of a `j_…` marketplace request.
#[derive(Debug, Deserialize)]
pub struct RequestCollection {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub view_id: String,
    #[serde(default)]
    pub dataset_id: String,
}

impl RequestCollection {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("done")
    }
}

/// One entry from the dataset's snapshot listing. The listing shape varies
/// between API revisions, so fields are normalized from several aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotMeta {
    #[serde(alias = "snapshot_id", alias = "_id", default)]
    pub id: String,
    #[serde(alias = "created_at", alias = "timestamp", default)]
    pub created: String,
    #[serde(alias = "state", default)]
    pub status: String,
    #[serde(default)]
    pub dataset_id: String,
}

/// Filters for a keyword-discovery trigger.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilters {
    /// `mm-dd-yyyy`, may be empty.
    pub start_date: String,
    pub end_date: String,
    pub country: String,
}

/// Client for the Bright Data datasets REST API.
pub struct BrightDataClient {
    client: Client,
    api_key: String,
    base_url: Url,
    poll_max_attempts: u32,
    poll_delay: Duration,
}

impl BrightDataClient {
    /// Creates a new client pointed at the production Bright Data API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        api_key: &str,
        timeout_secs: u64,
        poll_max_attempts: u32,
        poll_delay_secs: u64,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(
            api_key,
            timeout_secs,
            poll_max_attempts,
            poll_delay_secs,
            DEFAULT_BASE_URL,
        )
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ProviderError::Api`] if `base_url` is not
    /// a valid URL.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        poll_max_attempts: u32,
        poll_delay_secs: u64,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("sourcedb/0.1 (post-sourcing)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ProviderError::Api {
            status: 0,
            message: format!("invalid base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
            poll_max_attempts,
            poll_delay: Duration::from_secs(poll_delay_secs),
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self
            .base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone());
        if !params.is_empty() {
            let mut q = url.query_pairs_mut();
            for (k, v) in params {
                q.append_pair(k, v);
            }
        }
        url
    }

    async fn get_json(&self, url: Url, context: &str) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    /// Triggers a keyword-discovery collection for the dataset: one input
    /// object per keyword. Returns the new snapshot id when the API provides
    /// one.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Api`] on a non-2xx response.
    /// - [`ProviderError::Http`] on network failure.
    pub async fn trigger_keyword_discovery(
        &self,
        dataset_id: &str,
        keywords: &[String],
        count: usize,
        filters: &DiscoveryFilters,
    ) -> Result<Option<String>, ProviderError> {
        let payload: Vec<Value> = keywords
            .iter()
            .map(|keyword| {
                json!({
                    "keyword": keyword,
                    "num_of_posts": count.to_string(),
                    "start_date": filters.start_date,
                    "end_date": filters.end_date,
                    "country": filters.country,
                })
            })
            .collect();

        let url = self.url(
            "datasets/v3/trigger",
            &[
                ("dataset_id", dataset_id),
                ("include_errors", "true"),
                ("type", "discover_new"),
                ("discover_by", "keyword"),
            ],
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let snapshot_id = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("snapshot_id").and_then(Value::as_str).map(String::from));
        debug!(dataset_id, ?snapshot_id, "triggered keyword discovery");
        Ok(snapshot_id)
    }

    /// Reads a snapshot once. HTTP 202 means the collection is still
    /// materializing and is reported as [`SnapshotState::Pending`] rather
    /// than an error; 429 is treated the same way, since a rate-limited
    /// read resolves itself on the next poll. The key may be an `s_…` id
    /// or the literal `latest`.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Api`] on any other non-2xx response.
    /// - [`ProviderError::Http`] on network failure.
    pub async fn fetch_snapshot(&self, snapshot_key: &str) -> Result<SnapshotState, ProviderError> {
        let url = self.url(
            &format!("datasets/v3/snapshot/{snapshot_key}"),
            &[("format", "json")],
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::ACCEPTED
            || response.status() == StatusCode::TOO_MANY_REQUESTS
        {
            return Ok(SnapshotState::Pending);
        }
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let parsed: Value =
            serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
                context: format!("snapshot {snapshot_key}"),
                source: e,
            })?;
        Ok(SnapshotState::Ready(items_from(parsed)))
    }

    /// Reads a snapshot with a bounded poll: waits between attempts while
    /// the snapshot is still materializing, and returns `Pending` if it has
    /// not settled within the configured budget.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`BrightDataClient::fetch_snapshot`].
    pub async fn fetch_snapshot_polling(
        &self,
        snapshot_key: &str,
    ) -> Result<SnapshotState, ProviderError> {
        for attempt in 0..self.poll_max_attempts.max(1) {
            match self.fetch_snapshot(snapshot_key).await? {
                SnapshotState::Ready(items) => return Ok(SnapshotState::Ready(items)),
                SnapshotState::Pending => {
                    debug!(snapshot_key, attempt, "snapshot still materializing");
                    tokio::time::sleep(self.poll_delay).await;
                }
            }
        }
        Ok(SnapshotState::Pending)
    }

    /// Resolves a `j_…` marketplace request id into its collection status
    /// and view id.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Api`] on a non-2xx response.
    /// - [`ProviderError::Deserialize`] if the response shape is unexpected.
    pub async fn resolve_request(
        &self,
        request_id: &str,
    ) -> Result<RequestCollection, ProviderError> {
        let url = self.url(
            "datasets/request_collection",
            &[("request_id", request_id)],
        );
        let body = self
            .get_json(url, &format!("request_collection {request_id}"))
            .await?;
        serde_json::from_value(body).map_err(|e| ProviderError::Deserialize {
            context: format!("request_collection {request_id}"),
            source: e,
        })
    }

    /// Reads the items behind a resolved view, trying the v3 endpoint first
    /// and falling back to the unversioned path. Rate limits (429) retry
    /// with back-off before the fallback is attempted.
    ///
    /// # Errors
    ///
    /// Returns the last endpoint's error if every candidate fails.
    pub async fn fetch_view_items(&self, view_id: &str) -> Result<Vec<Value>, ProviderError> {
        let paths = [
            format!("datasets/v3/view/{view_id}/items"),
            format!("datasets/view/{view_id}/items"),
        ];
        let mut last_err = None;
        let context = format!("view {view_id} items");
        for path in &paths {
            let url = self.url(path, &[("format", "json")]);
            let result =
                retry_with_backoff(2, 1_000, || self.get_json(url.clone(), &context)).await;
            match result {
                Ok(parsed) => return Ok(items_from(parsed)),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or(ProviderError::Api {
            status: 0,
            message: format!("no usable view endpoint for {view_id}"),
        }))
    }

    /// Lists the dataset's snapshots, newest first, trying the v3 endpoint
    /// and falling back to the unversioned path.
    ///
    /// # Errors
    ///
    /// Returns the last endpoint's error if every candidate fails.
    pub async fn list_snapshots(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<SnapshotMeta>, ProviderError> {
        let paths = ["datasets/v3/snapshots", "datasets/snapshots"];
        let mut last_err = None;
        for path in paths {
            let url = self.url(path, &[("dataset_id", dataset_id)]);
            match self.get_json(url, "snapshot listing").await {
                Ok(Value::Array(raw)) => {
                    let mut items: Vec<SnapshotMeta> = raw
                        .into_iter()
                        .filter_map(|v| serde_json::from_value::<SnapshotMeta>(v).ok())
                        .filter(|m| !m.id.is_empty())
                        .collect();
                    items.sort_by(|a, b| b.created.cmp(&a.created));
                    return Ok(items);
                }
                Ok(_) => {
                    last_err = Some(ProviderError::Api {
                        status: 0,
                        message: "snapshot listing was not an array".to_owned(),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or(ProviderError::Api {
            status: 0,
            message: "no usable snapshot listing endpoint".to_owned(),
        }))
    }
}

/// Accepts both response shapes the API uses: a bare array, or an object
/// with the rows under `data`.
fn items_from(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Classifies a polling job id: `s_…` snapshot ids and `j_…` request ids
/// are self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobIdKind {
    Snapshot,
    Request,
    Local,
}

#[must_use]
pub fn classify_job_id(id: &str) -> JobIdKind {
    let lower = id.to_ascii_lowercase();
    if lower.starts_with("s_") {
        JobIdKind::Snapshot
    } else if lower.starts_with("j_") {
        JobIdKind::Request
    } else {
        JobIdKind::Local
    }
}
