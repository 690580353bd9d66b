//! Shared domain types for the sourcing pipeline: the [`Platform`] enum, the
//! canonical [`Post`] entity every provider normalizes into, and the content
//! [`fingerprint`] used as fallback identity and dedup key.

pub mod app_config;
pub mod config;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};

/// The social platforms the pipeline can source posts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Youtube,
    Twitter,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Tiktok,
        Platform::Youtube,
        Platform::Twitter,
        Platform::Instagram,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
        }
    }

    /// Parses a platform name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownPlatform`] for anything that is not one of
    /// `tiktok`, `youtube`, `twitter`, `instagram`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_lowercase().as_str() {
            "tiktok" => Ok(Platform::Tiktok),
            "youtube" => Ok(Platform::Youtube),
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical post shape every provider's raw payload is normalized into.
///
/// `run_id`, `keyword`, and `score` are mutable tags merged on upsert; the
/// engagement counters and `raw_data` are overwritten on every ingestion so a
/// re-scrape refreshes stats. `fetched_at` here records normalization time;
/// the store stamps its own value at upsert time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub platform: Platform,
    pub run_id: String,
    pub keyword: String,
    pub author: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub followers: i64,
    pub fetched_at: DateTime<Utc>,
    pub score: Option<f64>,
    pub raw_data: serde_json::Value,
}

impl Post {
    /// An empty post skeleton for the given platform. Normalizers fill in
    /// whatever fields they can extract and leave the rest at these defaults.
    #[must_use]
    pub fn empty(platform: Platform) -> Self {
        Self {
            id: String::new(),
            platform,
            run_id: String::new(),
            keyword: String::new(),
            author: String::new(),
            url: String::new(),
            title: String::new(),
            description: String::new(),
            published_at: None,
            likes: 0,
            comments: 0,
            shares: 0,
            views: 0,
            followers: 0,
            fetched_at: Utc::now(),
            score: None,
            raw_data: serde_json::Value::Null,
        }
    }
}

/// Deterministic content fingerprint: SHA-256 of
/// `"{platform}:{discriminator}:{extra}"` truncated to 16 hex chars.
///
/// Used as the post id when a provider exposes no stable native id, and as
/// the in-batch dedup key in the normalizers. Identical inputs always produce
/// identical output.
#[must_use]
pub fn fingerprint(platform: Platform, discriminator: &str, extra: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(discriminator.as_bytes());
    hasher.update(b":");
    hasher.update(extra.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parse_roundtrip() {
        for p in Platform::ALL {
            assert_eq!(Platform::parse(p.as_str()).unwrap(), p);
        }
    }

    #[test]
    fn platform_parse_is_case_insensitive() {
        assert_eq!(Platform::parse(" TikTok ").unwrap(), Platform::Tiktok);
        assert_eq!(Platform::parse("X").unwrap(), Platform::Twitter);
    }

    #[test]
    fn platform_parse_rejects_unknown() {
        assert!(matches!(
            Platform::parse("myspace"),
            Err(CoreError::UnknownPlatform(_))
        ));
    }

    #[test]
    fn platform_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Platform::Youtube).unwrap(),
            "\"youtube\""
        );
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(Platform::Tiktok, "https://t.example/v/1", "2024-01-01");
        let b = fingerprint(Platform::Tiktok, "https://t.example/v/1", "2024-01-01");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_varies_with_inputs() {
        let base = fingerprint(Platform::Tiktok, "url", "ts");
        assert_ne!(base, fingerprint(Platform::Youtube, "url", "ts"));
        assert_ne!(base, fingerprint(Platform::Tiktok, "url2", "ts"));
        assert_ne!(base, fingerprint(Platform::Tiktok, "url", "ts2"));
    }

    #[test]
    fn empty_post_has_zeroed_counters() {
        let post = Post::empty(Platform::Instagram);
        assert_eq!(post.platform, Platform::Instagram);
        assert_eq!(post.likes, 0);
        assert!(post.published_at.is_none());
        assert!(post.score.is_none());
    }
}
