//! Provider clients and normalizers for the sourcing pipeline.
//!
//! Three collection backends feed the pipeline: Apify actor runs (TikTok,
//! Instagram), the Bright Data datasets API (YouTube), and a local fetch
//! script (Twitter). Each backend gets a client here, and each platform a
//! normalizer that turns the raw payloads into canonical posts.

pub mod apify;
pub mod brightdata;
pub mod error;
pub mod extract;
pub mod normalize;
mod retry;
pub mod twitter;

pub use apify::{ActorRun, ApifyClient};
pub use brightdata::{
    classify_job_id, BrightDataClient, DiscoveryFilters, JobIdKind, RequestCollection,
    SnapshotMeta, SnapshotState,
};
pub use error::ProviderError;
pub use normalize::{
    normalize_instagram, normalize_tiktok, normalize_twitter, normalize_youtube,
};
pub use twitter::TwitterFetcher;
