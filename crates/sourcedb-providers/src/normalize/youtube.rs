//! YouTube normalizer for Bright Data snapshot rows.
//!
//! Keyword attribution comes from the discovery input echoed back in each
//! row. Unlike TikTok, filtering is exact: a row with a discovered keyword
//! outside the requested set is dropped, while rows with no attribution at
//! all pass through.

use serde_json::Value;
use sourcedb_core::{Platform, Post};

use crate::extract::{pick_count, pick_str, pick_timestamp, truncate_chars};
use crate::normalize::DedupSet;

const TITLE_MAX: usize = 120;

fn discovered_keyword(item: &Value) -> String {
    pick_str(
        item,
        &[
            "input.discovery_input.keyword",
            "discovery_input.keyword",
            "keyword",
        ],
    )
}

/// Normalizes raw YouTube rows, filtering to the requested keywords and
/// dropping in-batch duplicates by URL and publish time.
#[must_use]
pub fn normalize_youtube(raw: &[Value], keywords: &[String]) -> Vec<Post> {
    let mut seen = DedupSet::new(Platform::Youtube);
    let mut posts = Vec::new();

    for item in raw {
        let discovered = discovered_keyword(item);
        if !keywords.is_empty() && !discovered.is_empty() && !keywords.contains(&discovered) {
            continue;
        }

        let url = pick_str(item, &["url", "video_url"]);
        let published_at = pick_timestamp(item, &["timestamp", "date_posted", "published_at"]);
        let published_key = published_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let Some(hash) = seen.admit(&url, &published_key) else {
            continue;
        };

        let native_id = pick_str(item, &["id", "video_id"]);
        let mut post = Post::empty(Platform::Youtube);
        post.id = if native_id.is_empty() {
            hash
        } else {
            format!("youtube:{native_id}")
        };
        post.keyword = discovered;
        post.author = pick_str(item, &["channel.channel_name", "youtuber", "handle_name"]);
        post.url = url;
        post.title = truncate_chars(&pick_str(item, &["title"]), TITLE_MAX);
        post.description = pick_str(item, &["description"]);
        post.published_at = published_at;
        post.likes = pick_count(item, &["likes"]);
        post.comments = pick_count(item, &["comments", "num_comments"]);
        post.views = pick_count(item, &["views"]);
        post.followers = pick_count(item, &["channel.subscriber_count", "subscribers"]);
        post.raw_data = item.clone();
        posts.push(post);
    }

    posts
}
