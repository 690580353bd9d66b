//! Idempotent post storage across the per-platform tables.
//!
//! Each platform owns an identically-shaped table; writes go through
//! [`upsert_posts`] which reconciles re-ingested rows instead of duplicating
//! them, and reads go through [`query_posts`] which can span all four tables
//! with a `UNION ALL`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sourcedb_core::{fingerprint, Platform, Post};
use sqlx::PgPool;
use tracing::warn;

use crate::DbError;

/// A stored post row, shared across all four platform tables.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PostRow {
    pub id: String,
    pub platform: String,
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
    pub fetched_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub raw_data: serde_json::Value,
}

/// Which platform tables a read should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFilter {
    All,
    One(Platform),
}

#[must_use]
pub fn table_for(platform: Platform) -> &'static str {
    match platform {
        Platform::Tiktok => "tiktok_posts",
        Platform::Youtube => "youtube_posts",
        Platform::Twitter => "twitter_posts",
        Platform::Instagram => "instagram_posts",
    }
}

const POST_COLUMNS: &str = "id, platform, run_id, keyword, author, url, title, description, \
     published_at, likes, comments, shares, views, followers, fetched_at, score, raw_data";

/// Upsert a batch of normalized posts into the platform's table.
///
/// Insert semantics, per row:
/// - conflict on `id` updates the existing row instead of failing;
/// - `run_id`, `keyword`, `author`, `url`, `title`, `description` keep the
///   stored value when the incoming one is empty (latest non-empty wins);
/// - `published_at` and `score` keep the stored value when the incoming one
///   is NULL;
/// - engagement counters and `raw_data` are overwritten so a re-scrape
///   refreshes stats;
/// - `fetched_at` is stamped server-side at upsert time.
///
/// Rows with an empty `id` get a content fingerprint id derived from
/// `url` and `published_at`. A row that fails to write is logged and skipped
/// so one bad record cannot sink the batch.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Currently infallible per-row failures are absorbed; the `Result` is kept
/// for pool-level failures surfaced by future schema changes.
pub async fn upsert_posts(
    pool: &PgPool,
    platform: Platform,
    posts: &[Post],
    run_id: &str,
) -> Result<i64, DbError> {
    let table = table_for(platform);
    let sql = format!(
        "INSERT INTO {table} ({POST_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), $15, $16) \
         ON CONFLICT (id) DO UPDATE SET \
           run_id = COALESCE(NULLIF(EXCLUDED.run_id, ''), {table}.run_id), \
           keyword = COALESCE(NULLIF(EXCLUDED.keyword, ''), {table}.keyword), \
           author = COALESCE(NULLIF(EXCLUDED.author, ''), {table}.author), \
           url = COALESCE(NULLIF(EXCLUDED.url, ''), {table}.url), \
           title = COALESCE(NULLIF(EXCLUDED.title, ''), {table}.title), \
           description = COALESCE(NULLIF(EXCLUDED.description, ''), {table}.description), \
           published_at = COALESCE(EXCLUDED.published_at, {table}.published_at), \
           likes = EXCLUDED.likes, \
           comments = EXCLUDED.comments, \
           shares = EXCLUDED.shares, \
           views = EXCLUDED.views, \
           followers = EXCLUDED.followers, \
           fetched_at = NOW(), \
           score = COALESCE(EXCLUDED.score, {table}.score), \
           raw_data = EXCLUDED.raw_data"
    );

    let mut written = 0_i64;
    for post in posts {
        let id = if post.id.trim().is_empty() {
            let ts = post
                .published_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            fingerprint(platform, &post.url, &ts)
        } else {
            post.id.clone()
        };

        let effective_run_id = if post.run_id.is_empty() {
            run_id
        } else {
            post.run_id.as_str()
        };

        let result = sqlx::query(&sql)
            .bind(&id)
            .bind(platform.as_str())
            .bind(effective_run_id)
            .bind(&post.keyword)
            .bind(&post.author)
            .bind(&post.url)
            .bind(&post.title)
            .bind(&post.description)
            .bind(post.published_at)
            .bind(post.likes)
            .bind(post.comments)
            .bind(post.shares)
            .bind(post.views)
            .bind(post.followers)
            .bind(post.score)
            .bind(&post.raw_data)
            .execute(pool)
            .await;

        match result {
            Ok(_) => written += 1,
            Err(error) => {
                warn!(platform = %platform, post_id = %id, %error, "skipping post that failed to upsert");
            }
        }
    }

    Ok(written)
}

fn select_sql(filter: PlatformFilter, with_run_filter: bool) -> String {
    let run_clause = if with_run_filter {
        " WHERE run_id = $1"
    } else {
        ""
    };
    match filter {
        PlatformFilter::One(platform) => {
            let table = table_for(platform);
            format!("SELECT {POST_COLUMNS} FROM {table}{run_clause}")
        }
        PlatformFilter::All => Platform::ALL
            .iter()
            .map(|p| {
                let table = table_for(*p);
                format!("SELECT {POST_COLUMNS} FROM {table}{run_clause}")
            })
            .collect::<Vec<_>>()
            .join(" UNION ALL "),
    }
}

/// Fetch stored posts, newest ingestion first.
///
/// `PlatformFilter::All` reads every platform table with a `UNION ALL`;
/// ordering is `fetched_at DESC NULLS LAST` across the combined set, then
/// paged with `limit`/`offset`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn query_posts(
    pool: &PgPool,
    filter: PlatformFilter,
    run_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostRow>, DbError> {
    let inner = select_sql(filter, run_id.is_some());
    let (limit_param, offset_param) = if run_id.is_some() {
        ("$2", "$3")
    } else {
        ("$1", "$2")
    };
    let sql = format!(
        "SELECT * FROM ({inner}) AS posts \
         ORDER BY fetched_at DESC NULLS LAST \
         LIMIT {limit_param} OFFSET {offset_param}"
    );

    let mut query = sqlx::query_as::<_, PostRow>(&sql);
    if let Some(run_id) = run_id {
        query = query.bind(run_id);
    }
    let rows = query.bind(limit).bind(offset).fetch_all(pool).await?;
    Ok(rows)
}

/// Count stored posts matching the same filters as [`query_posts`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_posts(
    pool: &PgPool,
    filter: PlatformFilter,
    run_id: Option<&str>,
) -> Result<i64, DbError> {
    let inner = select_sql(filter, run_id.is_some());
    let sql = format!("SELECT COUNT(*) FROM ({inner}) AS posts");

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(run_id) = run_id {
        query = query.bind(run_id);
    }
    let count = query.fetch_one(pool).await?;
    Ok(count)
}
