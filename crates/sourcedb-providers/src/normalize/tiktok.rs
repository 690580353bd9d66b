//! TikTok normalizer for the Apify actor's output.
//!
//! The actor mixes results for several search queries into one dataset, so
//! this normalizer re-filters by keyword. Matching is deliberately fuzzy:
//! hashtag and search-query tokens are compared after stripping everything
//! but letters, digits, and CJK characters, and when no token matches, a
//! plain substring scan over the text fields gets a second chance.

use serde_json::Value;
use sourcedb_core::{Platform, Post};

use crate::extract::{pick_count, pick_str, pick_timestamp, truncate_chars};
use crate::normalize::DedupSet;

const TITLE_MAX: usize = 80;

/// Lowercases and strips everything except ASCII alphanumerics and CJK
/// ideographs, so `#RustLang` and `rust lang` compare equal.
fn normalize_token(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fa5}').contains(c))
        .collect()
}

fn discovered_keyword(item: &Value) -> String {
    pick_str(
        item,
        &[
            "input",
            "discovery_input.search_keyword",
            "search_keyword",
            "keyword",
        ],
    )
}

fn matches_keywords(item: &Value, keywords: &[String], discovered: &str) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let wanted: Vec<String> = keywords
        .iter()
        .map(|k| normalize_token(k))
        .filter(|k| !k.is_empty())
        .collect();
    if wanted.is_empty() {
        return true;
    }

    let mut candidates: Vec<String> = Vec::new();
    if !discovered.is_empty() {
        candidates.push(discovered.to_owned());
    }
    let hashtag = pick_str(item, &["searchHashtag.name"]);
    if !hashtag.is_empty() {
        candidates.push(hashtag);
    }
    if let Some(tags) = item.get("hashtags").and_then(Value::as_array) {
        for tag in tags {
            let name = pick_str(tag, &["name"]);
            if !name.is_empty() {
                candidates.push(name);
            }
        }
    }
    if candidates
        .iter()
        .any(|c| wanted.contains(&normalize_token(c)))
    {
        return true;
    }

    // Token miss: fall back to substring search over the text fields, using
    // the raw keyword this time.
    let joined = ["text", "title", "description", "desc", "caption"]
        .iter()
        .map(|f| pick_str(item, &[f]))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && joined.contains(&k.to_lowercase()))
}

/// Normalizes raw TikTok items, filtering to the requested keywords and
/// dropping in-batch duplicates.
#[must_use]
pub fn normalize_tiktok(raw: &[Value], keywords: &[String]) -> Vec<Post> {
    let mut seen = DedupSet::new(Platform::Tiktok);
    let mut posts = Vec::new();

    for item in raw {
        let discovered = discovered_keyword(item);
        if !matches_keywords(item, keywords, &discovered) {
            continue;
        }

        let url = pick_str(item, &["webVideoUrl", "url", "share_url", "tiktokLink"]);
        let published_at = pick_timestamp(
            item,
            &[
                "createTime",
                "createTimeISO",
                "create_time",
                "timestamp",
                "published_at",
            ],
        );

        let native_id = pick_str(item, &["id", "post_id"]);
        let published_key = published_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let dedup_key = format!("{native_id}|{url}|{published_key}");
        let Some(hash) = seen.admit(&dedup_key, "") else {
            continue;
        };

        let mut post = Post::empty(Platform::Tiktok);
        post.id = if native_id.is_empty() {
            hash
        } else {
            format!("tiktok:{native_id}")
        };
        post.keyword = discovered;
        post.author = pick_str(
            item,
            &[
                "authorMeta.uniqueId",
                "authorMeta.nickname",
                "profile_username",
                "author_name",
                "username",
                "author",
                "account_id",
            ],
        );
        post.url = url;
        post.title = truncate_chars(
            &pick_str(item, &["text", "title", "description", "desc"]),
            TITLE_MAX,
        );
        post.description = pick_str(item, &["text", "description", "desc", "caption"]);
        post.published_at = published_at;
        post.likes = pick_count(item, &["diggCount", "digg_count", "like_count", "likes"]);
        post.comments = pick_count(item, &["commentCount", "comment_count", "comments"]);
        post.shares = pick_count(item, &["shareCount", "share_count", "shares"]);
        post.views = pick_count(item, &["playCount", "play_count", "views"]);
        post.followers = pick_count(
            item,
            &[
                "authorMeta.followerCount",
                "profile_followers",
                "author_followers",
                "followers",
            ],
        );
        post.raw_data = item.clone();
        posts.push(post);
    }

    posts
}
