//! Production [`PlatformSource`] implementations wired to the provider
//! clients. Each source owns its client plus the actor/dataset settings it
//! needs, and returns normalized posts ready for the store.

use async_trait::async_trait;
use serde_json::{json, Value};
use sourcedb_core::Platform;
use sourcedb_providers::{
    normalize_instagram, normalize_tiktok, normalize_twitter, normalize_youtube, ApifyClient,
    BrightDataClient, DiscoveryFilters, ProviderError, SnapshotState, TwitterFetcher,
};
use tracing::warn;

use crate::{PendingJob, PlatformSource, SourceBatch};

/// TikTok via an Apify search actor, one run per keyword.
pub struct TiktokSource {
    client: ApifyClient,
    actor: String,
}

impl TiktokSource {
    #[must_use]
    pub fn new(client: ApifyClient, actor: String) -> Self {
        Self { client, actor }
    }

    fn input_for(keyword: &str, count: usize) -> Value {
        json!({
            "searchQueries": [keyword],
            "resultsPerPage": count,
            "excludePinnedPosts": false,
            "proxyCountryCode": "None",
            "scrapeRelatedVideos": false,
            "shouldDownloadVideos": false,
            "shouldDownloadCovers": false,
            "shouldDownloadSubtitles": false,
            "shouldDownloadSlideshowImages": false,
            "shouldDownloadAvatars": false,
            "shouldDownloadMusicCovers": false,
            "profileScrapeSections": ["videos"],
            "profileSorting": "latest",
            "searchSection": "",
            "maxProfilesPerQuery": 10
        })
    }
}

#[async_trait]
impl PlatformSource for TiktokSource {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    async fn fetch(
        &self,
        keywords: &[String],
        count: usize,
    ) -> Result<SourceBatch, ProviderError> {
        let mut raw = Vec::new();
        for keyword in keywords.iter().filter(|k| !k.trim().is_empty()) {
            let input = Self::input_for(keyword.trim(), count);
            let items = self.client.run_actor_collect(&self.actor, &input, count).await?;
            raw.extend(items);
        }
        Ok(SourceBatch::ready(normalize_tiktok(&raw, keywords)))
    }
}

/// How Instagram keywords are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstagramMode {
    /// Keywords are hashtags; posts come from the tag pages.
    #[default]
    Hashtag,
    /// Keywords are handles or profile URLs; posts come from the profiles.
    Profile,
}

/// Instagram via Apify. Hashtag collection prefers the dedicated hashtag
/// scraper and falls back to the generic one; profile collection always
/// uses the generic scraper with direct URLs.
pub struct InstagramSource {
    client: ApifyClient,
    generic_actor: String,
    session_id: Option<String>,
    mode: InstagramMode,
}

const HASHTAG_ACTOR: &str = "apify/instagram-hashtag-scraper";

impl InstagramSource {
    #[must_use]
    pub fn new(
        client: ApifyClient,
        generic_actor: String,
        session_id: Option<String>,
        mode: InstagramMode,
    ) -> Self {
        Self {
            client,
            generic_actor,
            session_id,
            mode,
        }
    }

    fn generic_input(&self, direct_urls: Vec<String>, total_limit: usize) -> Value {
        json!({
            "resultsType": "posts",
            "resultsLimit": total_limit,
            "addParentData": true,
            "directUrls": direct_urls,
            "sessionid": self.session_id,
        })
    }

    fn profile_urls(keywords: &[String]) -> Vec<String> {
        keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                if k.starts_with("http") {
                    k.to_owned()
                } else {
                    format!("https://www.instagram.com/{}/", k.trim_start_matches('@'))
                }
            })
            .collect()
    }

    fn hashtag_urls(keywords: &[String]) -> Vec<String> {
        keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                format!(
                    "https://www.instagram.com/explore/tags/{}/",
                    k.trim_start_matches('#')
                )
            })
            .collect()
    }
}

#[async_trait]
impl PlatformSource for InstagramSource {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn fetch(
        &self,
        keywords: &[String],
        count: usize,
    ) -> Result<SourceBatch, ProviderError> {
        // Each keyword gets its own budget, not a share of one.
        let total_limit = count.max(1) * keywords.len().max(1);

        let items = match self.mode {
            InstagramMode::Hashtag => {
                let hashtag_input = json!({
                    "hashtags": keywords
                        .iter()
                        .map(|k| k.trim_start_matches('#'))
                        .collect::<Vec<_>>(),
                    "resultsLimit": total_limit,
                    "sessionid": self.session_id,
                });
                match self
                    .client
                    .run_actor_collect(HASHTAG_ACTOR, &hashtag_input, total_limit)
                    .await
                {
                    Ok(items) => items,
                    Err(error) => {
                        warn!(%error, "hashtag scraper failed, falling back to generic actor");
                        let input =
                            self.generic_input(Self::hashtag_urls(keywords), total_limit);
                        self.client
                            .run_actor_collect(&self.generic_actor, &input, total_limit)
                            .await?
                    }
                }
            }
            InstagramMode::Profile => {
                let input = self.generic_input(Self::profile_urls(keywords), total_limit);
                self.client
                    .run_actor_collect(&self.generic_actor, &input, total_limit)
                    .await?
            }
        };

        Ok(SourceBatch::ready(normalize_instagram(&items)))
    }
}

/// YouTube via Bright Data keyword discovery. Collection is asynchronous on
/// the provider side: when the snapshot has not materialized within the
/// client's poll budget the batch comes back pending, carrying the snapshot
/// id for later polling.
pub struct YoutubeSource {
    client: BrightDataClient,
    dataset_id: String,
    filters: DiscoveryFilters,
}

impl YoutubeSource {
    #[must_use]
    pub fn new(client: BrightDataClient, dataset_id: String, filters: DiscoveryFilters) -> Self {
        Self {
            client,
            dataset_id,
            filters,
        }
    }
}

#[async_trait]
impl PlatformSource for YoutubeSource {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn fetch(
        &self,
        keywords: &[String],
        count: usize,
    ) -> Result<SourceBatch, ProviderError> {
        let snapshot_id = self
            .client
            .trigger_keyword_discovery(&self.dataset_id, keywords, count, &self.filters)
            .await?;

        let Some(snapshot_id) = snapshot_id else {
            // Trigger accepted but no snapshot id yet; the caller can only
            // poll `latest` later.
            return Ok(SourceBatch::pending(PendingJob { snapshot_id: None }));
        };

        match self.client.fetch_snapshot_polling(&snapshot_id).await? {
            SnapshotState::Ready(items) => {
                Ok(SourceBatch::ready(normalize_youtube(&items, keywords)))
            }
            SnapshotState::Pending => Ok(SourceBatch::pending(PendingJob {
                snapshot_id: Some(snapshot_id),
            })),
        }
    }
}

/// Twitter via the local fetch script.
pub struct TwitterSource {
    fetcher: TwitterFetcher,
    mode: String,
}

impl TwitterSource {
    #[must_use]
    pub fn new(fetcher: TwitterFetcher, mode: String) -> Self {
        Self { fetcher, mode }
    }
}

#[async_trait]
impl PlatformSource for TwitterSource {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn fetch(
        &self,
        keywords: &[String],
        count: usize,
    ) -> Result<SourceBatch, ProviderError> {
        let items = self.fetcher.fetch(keywords, count, &self.mode).await?;
        Ok(SourceBatch::ready(normalize_twitter(&items)))
    }
}
