//! Twitter normalizer. The fetch script already emits near-canonical
//! records, so this is a thin mapper plus the usual dedup and fallback-id
//! rules.

use serde_json::Value;
use sourcedb_core::{Platform, Post};

use crate::extract::{pick_count, pick_str, pick_timestamp};
use crate::normalize::DedupSet;

/// Normalizes the fetch script's output, dropping in-batch duplicates by
/// URL and publish time.
#[must_use]
pub fn normalize_twitter(raw: &[Value]) -> Vec<Post> {
    let mut seen = DedupSet::new(Platform::Twitter);
    let mut posts = Vec::new();

    for item in raw {
        let url = pick_str(item, &["url"]);
        let published_at = pick_timestamp(item, &["published_at"]);
        let published_key = published_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let Some(hash) = seen.admit(&url, &published_key) else {
            continue;
        };

        let mut post = Post::empty(Platform::Twitter);
        let native_id = pick_str(item, &["postId", "id"]);
        post.id = if native_id.is_empty() { hash } else { native_id };
        post.keyword = pick_str(item, &["keyword"]);
        post.author = pick_str(item, &["author"]);
        post.url = url;
        post.title = pick_str(item, &["title"]);
        post.description = pick_str(item, &["desc", "description"]);
        post.published_at = published_at;
        post.likes = pick_count(item, &["likes"]);
        post.comments = pick_count(item, &["comments"]);
        post.shares = pick_count(item, &["shares"]);
        post.views = pick_count(item, &["views"]);
        post.followers = pick_count(item, &["followers"]);
        post.raw_data = item.clone();
        posts.push(post);
    }

    posts
}
