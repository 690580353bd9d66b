//! Instagram normalizer for the Apify scraper output.
//!
//! Instagram sourcing is hashtag- or profile-driven rather than keyword
//! search, so normalized posts carry no keyword attribution. Captions serve
//! as both title (truncated) and description, and the graph-API style
//! nested counters are flattened.

use serde_json::Value;
use sourcedb_core::{Platform, Post};

use crate::extract::{coerce_timestamp, pick_count, pick_str, pick_timestamp, truncate_chars};
use crate::normalize::DedupSet;

const TITLE_MAX: usize = 80;

fn post_url(item: &Value) -> String {
    let url = pick_str(item, &["url", "displayUrl"]);
    if !url.is_empty() {
        return url;
    }
    let shortcode = pick_str(item, &["shortcode"]);
    if shortcode.is_empty() {
        String::new()
    } else {
        format!("https://www.instagram.com/p/{shortcode}/")
    }
}

fn published_at(item: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Some(t) = pick_timestamp(item, &["timestamp"]) {
        return Some(t);
    }
    // taken_at_timestamp is always Unix seconds.
    item.get("taken_at_timestamp").and_then(coerce_timestamp)
}

/// Normalizes raw Instagram items, dropping in-batch duplicates by URL and
/// publish time.
#[must_use]
pub fn normalize_instagram(raw: &[Value]) -> Vec<Post> {
    let mut seen = DedupSet::new(Platform::Instagram);
    let mut posts = Vec::new();

    for item in raw {
        let url = post_url(item);
        let published_at = published_at(item);
        let published_key = published_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let Some(hash) = seen.admit(&url, &published_key) else {
            continue;
        };

        let caption = pick_str(item, &["caption", "edge_media_to_caption.edges.0.node.text"]);
        let native_id = pick_str(item, &["id", "shortcode"]);

        let mut post = Post::empty(Platform::Instagram);
        post.id = if native_id.is_empty() {
            hash
        } else {
            format!("instagram:{native_id}")
        };
        post.author = pick_str(item, &["owner.username", "username", "user.username"]);
        post.url = url;
        post.title = truncate_chars(&caption, TITLE_MAX);
        post.description = caption;
        post.published_at = published_at;
        post.likes = pick_count(item, &["edge_media_preview_like.count", "like_count"]);
        post.comments = pick_count(item, &["edge_media_to_comment.count", "comment_count"]);
        post.views = pick_count(item, &["video_view_count", "view_count"]);
        post.followers = pick_count(item, &["owner.edge_followed_by.count"]);
        post.raw_data = item.clone();
        posts.push(post);
    }

    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_style_item() -> Value {
        json!({
            "id": "ig1",
            "shortcode": "Cxyz",
            "edge_media_to_caption": {"edges": [{"node": {"text": "sunset over the bay"}}]},
            "owner": {"username": "traveler", "edge_followed_by": {"count": 3000}},
            "edge_media_preview_like": {"count": 250},
            "edge_media_to_comment": {"count": 14},
            "taken_at_timestamp": 1_700_000_000,
            "video_view_count": 900
        })
    }

    #[test]
    fn maps_graph_api_shapes() {
        let posts = normalize_instagram(&[graph_style_item()]);
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.id, "instagram:ig1");
        assert_eq!(post.author, "traveler");
        assert_eq!(post.url, "https://www.instagram.com/p/Cxyz/");
        assert_eq!(post.title, "sunset over the bay");
        assert_eq!(post.likes, 250);
        assert_eq!(post.comments, 14);
        assert_eq!(post.views, 900);
        assert_eq!(post.followers, 3000);
        assert_eq!(post.published_at.unwrap().timestamp(), 1_700_000_000);
        assert!(post.keyword.is_empty(), "instagram has no keyword attribution");
    }

    #[test]
    fn maps_flat_scraper_shapes() {
        let item = json!({
            "id": "ig2",
            "url": "https://www.instagram.com/p/Cabc/",
            "caption": "coffee time",
            "username": "barista",
            "like_count": 12,
            "comment_count": 3,
            "timestamp": "2024-05-01T09:00:00Z"
        });
        let posts = normalize_instagram(&[item]);
        let post = &posts[0];
        assert_eq!(post.author, "barista");
        assert_eq!(post.description, "coffee time");
        assert_eq!(post.likes, 12);
        assert!(post.published_at.is_some());
    }

    #[test]
    fn duplicates_collapse_within_a_batch() {
        let posts = normalize_instagram(&[graph_style_item(), graph_style_item()]);
        assert_eq!(posts.len(), 1);
    }

    #[test]
    fn caption_title_is_truncated() {
        let mut item = graph_style_item();
        item["caption"] = Value::String("c".repeat(200));
        let posts = normalize_instagram(&[item]);
        assert_eq!(posts[0].title.chars().count(), 80);
        assert_eq!(posts[0].description.chars().count(), 200);
    }
}
