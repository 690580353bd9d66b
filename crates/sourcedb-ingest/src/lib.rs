//! Orchestration for sourcing runs: fan out to the requested platform
//! sources concurrently, persist whatever each one returns, and report a
//! per-platform outcome. One platform failing never aborts the others.

pub mod sources;

use async_trait::async_trait;
use serde::Serialize;
use sourcedb_core::{Platform, Post};
use sourcedb_db::DbError;
use sourcedb_providers::ProviderError;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Db(#[from] DbError),
}

/// An asynchronous collection that has been triggered but whose results are
/// not yet available; the caller is expected to poll for them later.
#[derive(Debug, Clone, Serialize)]
pub struct PendingJob {
    pub snapshot_id: Option<String>,
}

/// What one platform source produced for a fetch: zero or more normalized
/// posts, and optionally a pending job when collection continues remotely.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub posts: Vec<Post>,
    pub pending: Option<PendingJob>,
}

impl SourceBatch {
    #[must_use]
    pub fn ready(posts: Vec<Post>) -> Self {
        Self {
            posts,
            pending: None,
        }
    }

    #[must_use]
    pub fn pending(job: PendingJob) -> Self {
        Self {
            posts: Vec::new(),
            pending: Some(job),
        }
    }
}

/// A platform-specific collection backend. Implementations fetch raw posts
/// for a keyword set and return them normalized.
#[async_trait]
pub trait PlatformSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetches and normalizes up to `count` posts per keyword.
    async fn fetch(&self, keywords: &[String], count: usize)
        -> Result<SourceBatch, ProviderError>;
}

/// A request to source posts across platforms.
#[derive(Debug, Clone)]
pub struct DiscoverRequest {
    pub platforms: Vec<Platform>,
    pub keywords: Vec<String>,
    pub count: usize,
    /// Reuse an existing run id to merge into it; `None` starts a new run.
    pub run_id: Option<String>,
}

/// Per-platform result of a discover call.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PlatformOutcome {
    /// Posts were fetched and persisted; `posts` is the persisted slice in
    /// the order the provider returned it, `raw` the pre-slice batch size.
    Fetched {
        platform: Platform,
        saved: i64,
        raw: usize,
        posts: Vec<Post>,
    },
    /// Collection was triggered but is still materializing remotely.
    Pending { platform: Platform, job: PendingJob },
    /// The source failed; other platforms are unaffected.
    Failed { platform: Platform, error: String },
}

#[derive(Debug, Serialize)]
pub struct DiscoverOutcome {
    pub run_id: String,
    pub outcomes: Vec<PlatformOutcome>,
}

impl DiscoverOutcome {
    #[must_use]
    pub fn total_saved(&self) -> i64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                PlatformOutcome::Fetched { saved, .. } => *saved,
                _ => 0,
            })
            .sum()
    }

    /// Every persisted post across the fetched outcomes, in fan-out order.
    /// Callers that need the run's posts must read them from here rather
    /// than re-query the store, which would reorder by fetch time and pull
    /// in earlier calls that shared the run id.
    #[must_use]
    pub fn posts(&self) -> Vec<&Post> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                PlatformOutcome::Fetched { posts, .. } => Some(posts.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Keeps the first `count` posts in arrival order. Ranking by engagement
/// was tried and abandoned upstream of storage; arrival order preserves
/// the providers' own relevance ordering.
#[must_use]
pub fn rank_and_slice(mut posts: Vec<Post>, count: usize) -> Vec<Post> {
    posts.truncate(count.max(1));
    posts
}

/// Runs a sourcing pass: registers (or merges) the run, fans out to every
/// requested platform concurrently, and persists each platform's posts as
/// soon as its source returns.
///
/// # Errors
///
/// Returns [`IngestError::Db`] only for run-registry failures; per-platform
/// fetch and persistence failures are folded into the outcome list.
pub async fn discover(
    pool: &PgPool,
    sources: &[&dyn PlatformSource],
    request: &DiscoverRequest,
) -> Result<DiscoverOutcome, IngestError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let count = request.count.max(1) as i32;
    let run_id = sourcedb_db::create_or_merge_run(
        pool,
        request.run_id.as_deref(),
        &request.platforms,
        &request.keywords,
        count,
    )
    .await?;

    let active: Vec<&&dyn PlatformSource> = sources
        .iter()
        .filter(|s| request.platforms.contains(&s.platform()))
        .collect();

    let fetches = active
        .iter()
        .map(|source| source.fetch(&request.keywords, request.count));
    let results = futures::future::join_all(fetches).await;

    let mut outcomes = Vec::with_capacity(active.len());
    for (source, result) in active.iter().zip(results) {
        let platform = source.platform();
        let outcome = match result {
            Ok(batch) => {
                if let Some(job) = batch.pending {
                    info!(%platform, %run_id, "collection pending, results arrive later");
                    PlatformOutcome::Pending { platform, job }
                } else {
                    let raw = batch.posts.len();
                    // Per-keyword budget across the whole batch.
                    let posts = rank_and_slice(
                        batch.posts,
                        request.count.max(1) * request.keywords.len().max(1),
                    );
                    match sourcedb_db::upsert_posts(pool, platform, &posts, &run_id).await {
                        Ok(saved) => {
                            info!(%platform, %run_id, saved, raw, "persisted sourced posts");
                            PlatformOutcome::Fetched {
                                platform,
                                saved,
                                raw,
                                posts,
                            }
                        }
                        Err(error) => {
                            warn!(%platform, %run_id, %error, "failed to persist batch");
                            PlatformOutcome::Failed {
                                platform,
                                error: error.to_string(),
                            }
                        }
                    }
                }
            }
            Err(error) => {
                warn!(%platform, %run_id, %error, "platform source failed");
                PlatformOutcome::Failed {
                    platform,
                    error: error.to_string(),
                }
            }
        };
        outcomes.push(outcome);
    }

    Ok(DiscoverOutcome { run_id, outcomes })
}
