//! HTTP client for the Apify actor-run API.
//!
//! TikTok and Instagram sourcing goes through hosted Apify actors: start a
//! run with the actor's input, wait for it to reach a terminal state, then
//! read the run's default dataset. Runs that end in any state other than
//! `SUCCEEDED` surface as [`ProviderError::RunFailed`].

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.apify.com/";

// Apify holds the GET open up to this many seconds waiting for the run to
// finish, which keeps our poll loop short.
const WAIT_FOR_FINISH_SECS: u32 = 60;

// Datasets keep filling briefly after a run flips to SUCCEEDED; one short
// re-read recovers the stragglers.
const DATASET_SETTLE: Duration = Duration::from_millis(1500);

/// A started or finished actor run.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorRun {
    pub id: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    pub status: String,
}

impl ActorRun {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "SUCCEEDED" | "FAILED" | "ABORTED" | "TIMED-OUT"
        )
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Client for the Apify v2 REST API.
///
/// Use [`ApifyClient::new`] for production or [`ApifyClient::with_base_url`]
/// to point at a mock server in tests.
pub struct ApifyClient {
    client: Client,
    token: String,
    base_url: Url,
    poll_max_attempts: u32,
    poll_delay: Duration,
}

impl ApifyClient {
    /// Creates a new client pointed at the production Apify API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        token: &str,
        timeout_secs: u64,
        poll_max_attempts: u32,
        poll_delay_secs: u64,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(token, timeout_secs, poll_max_attempts, poll_delay_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ProviderError::Api`] if `base_url` is not
    /// a valid URL.
    pub fn with_base_url(
        token: &str,
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
            token: token.to_owned(),
            base_url,
            poll_max_attempts,
            poll_delay: Duration::from_secs(poll_delay_secs),
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Url {
        // join() cannot fail here: base_url is absolute and paths are
        // crate-controlled relative segments.
        let mut url = self
            .base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone());
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("token", &self.token);
            for (k, v) in params {
                q.append_pair(k, v);
            }
        }
        url
    }

    /// Starts an actor run with the given input.
    ///
    /// Named actors like `apify/instagram-hashtag-scraper` are addressed
    /// with the API's `user~name` form.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Api`] on a non-2xx response.
    /// - [`ProviderError::Http`] on network failure.
    /// - [`ProviderError::Deserialize`] if the response shape is unexpected.
    pub async fn start_actor_run(
        &self,
        actor_id: &str,
        input: &Value,
    ) -> Result<ActorRun, ProviderError> {
        let path = format!("v2/acts/{}/runs", actor_id.replace('/', "~"));
        let url = self.url(&path, &[]);
        let response = self.client.post(url).json(input).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let envelope: Envelope<ActorRun> =
            serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
                context: format!("start run for actor {actor_id}"),
                source: e,
            })?;
        debug!(actor_id, run_id = %envelope.data.id, "started apify actor run");
        Ok(envelope.data)
    }

    /// Fetches the current state of a run, letting the API hold the request
    /// open until the run finishes or the server-side wait expires.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ApifyClient::start_actor_run`].
    pub async fn get_run(&self, run_id: &str) -> Result<ActorRun, ProviderError> {
        let wait = WAIT_FOR_FINISH_SECS.to_string();
        let url = self.url(
            &format!("v2/actor-runs/{run_id}"),
            &[("waitForFinish", wait.as_str())],
        );
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let envelope: Envelope<ActorRun> =
            serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
                context: format!("get run {run_id}"),
                source: e,
            })?;
        Ok(envelope.data)
    }

    /// Waits for a run to reach a terminal state, bounded by the configured
    /// poll budget.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::RunFailed`] if the run ends as anything other than
    ///   `SUCCEEDED`, or if it is still running once the poll budget is
    ///   exhausted (reported with status `TIMEOUT-LOCAL`).
    /// - HTTP/deserialize failures as in [`ApifyClient::get_run`].
    pub async fn wait_for_run(&self, run_id: &str) -> Result<ActorRun, ProviderError> {
        for attempt in 0..self.poll_max_attempts.max(1) {
            let run = self.get_run(run_id).await?;
            if run.is_terminal() {
                if run.status == "SUCCEEDED" {
                    return Ok(run);
                }
                return Err(ProviderError::RunFailed {
                    run_id: run_id.to_owned(),
                    status: run.status,
                });
            }
            debug!(run_id, attempt, status = %run.status, "apify run still in progress");
            tokio::time::sleep(self.poll_delay).await;
        }
        Err(ProviderError::RunFailed {
            run_id: run_id.to_owned(),
            status: "TIMEOUT-LOCAL".to_owned(),
        })
    }

    /// Reads up to `limit` clean items from a dataset.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ApifyClient::start_actor_run`].
    pub async fn list_dataset_items(
        &self,
        dataset_id: &str,
        limit: usize,
    ) -> Result<Vec<Value>, ProviderError> {
        let limit = limit.to_string();
        let url = self.url(
            &format!("v2/datasets/{dataset_id}/items"),
            &[("clean", "true"), ("format", "json"), ("limit", limit.as_str())],
        );
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let items: Vec<Value> =
            serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
                context: format!("dataset {dataset_id} items"),
                source: e,
            })?;
        Ok(items)
    }

    /// Runs an actor to completion and collects its dataset items.
    ///
    /// Reads twice the wanted count to compensate for dedup downstream. If
    /// the first read comes back short, waits briefly and reads once more;
    /// a short final read is returned as-is rather than failing the batch.
    ///
    /// # Errors
    ///
    /// Propagates failures from starting, waiting on, or reading the run.
    pub async fn run_actor_collect(
        &self,
        actor_id: &str,
        input: &Value,
        wanted: usize,
    ) -> Result<Vec<Value>, ProviderError> {
        let run = self.start_actor_run(actor_id, input).await?;
        let finished = self.wait_for_run(&run.id).await?;

        let read_limit = wanted.saturating_mul(2).max(1);
        let mut items = self
            .list_dataset_items(&finished.default_dataset_id, read_limit)
            .await
            .unwrap_or_else(|error| {
                warn!(run_id = %run.id, %error, "dataset read failed, treating as empty");
                Vec::new()
            });

        if items.len() < wanted {
            tokio::time::sleep(DATASET_SETTLE).await;
            match self
                .list_dataset_items(&finished.default_dataset_id, read_limit)
                .await
            {
                Ok(second) if second.len() > items.len() => items = second,
                Ok(_) => {}
                Err(error) => {
                    warn!(run_id = %run.id, %error, "dataset re-read failed, keeping first read");
                }
            }
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_detection() {
        let mut run = ActorRun {
            id: "r1".to_owned(),
            default_dataset_id: "d1".to_owned(),
            status: "RUNNING".to_owned(),
        };
        assert!(!run.is_terminal());
        for status in ["SUCCEEDED", "FAILED", "ABORTED", "TIMED-OUT"] {
            run.status = status.to_owned();
            assert!(run.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn run_envelope_deserializes() {
        let body = r#"{"data":{"id":"abc","defaultDatasetId":"ds1","status":"SUCCEEDED","extra":1}}"#;
        let envelope: Envelope<ActorRun> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.id, "abc");
        assert_eq!(envelope.data.default_dataset_id, "ds1");
    }
}
