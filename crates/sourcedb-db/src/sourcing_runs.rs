//! The run registry: one row per sourcing run, merged rather than replaced
//! when the same run id is reported more than once (platforms fan out
//! concurrently and each reports completion independently).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sourcedb_core::Platform;
use sqlx::PgPool;
use tracing::info;

use crate::{posts::table_for, DbError};

/// A sourcing run row. `platforms` and `keywords` are comma-joined sets;
/// use [`SourcingRunRow::platform_list`] / [`SourcingRunRow::keyword_list`]
/// for the parsed forms.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SourcingRunRow {
    pub id: String,
    pub platforms: String,
    pub keywords: String,
    pub count: i32,
    pub started_at: Option<DateTime<Utc>>,
}

impl SourcingRunRow {
    #[must_use]
    pub fn platform_list(&self) -> Vec<&str> {
        self.platforms.split(',').filter(|s| !s.is_empty()).collect()
    }

    #[must_use]
    pub fn keyword_list(&self) -> Vec<&str> {
        self.keywords.split(',').filter(|s| !s.is_empty()).collect()
    }
}

/// Per-platform deletion tally returned by [`delete_run`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeletedCounts {
    pub tiktok: u64,
    pub youtube: u64,
    pub twitter: u64,
    pub instagram: u64,
}

impl DeletedCounts {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.tiktok + self.youtube + self.twitter + self.instagram
    }

    fn record(&mut self, platform: Platform, count: u64) {
        match platform {
            Platform::Tiktok => self.tiktok = count,
            Platform::Youtube => self.youtube = count,
            Platform::Twitter => self.twitter = count,
            Platform::Instagram => self.instagram = count,
        }
    }
}

fn generate_run_id(platforms: &[Platform]) -> String {
    let suffix = match platforms {
        [single] => single.as_str(),
        _ => "run",
    };
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

// Merges the stored comma-joined set with the incoming one: concatenate,
// split, trim each member, drop empties, and re-aggregate distinct members.
// Trimming happens here too so padded tokens from older rows still collapse.
const MERGE_SET: &str = "(SELECT string_agg(DISTINCT trim(t.v), ',') \
     FROM unnest(string_to_array(sourcing_runs.{col} || ',' || EXCLUDED.{col}, ',')) AS t(v) \
     WHERE trim(t.v) <> '')";

fn merge_set_sql(column: &str) -> String {
    MERGE_SET.replace("{col}", column)
}

// Comma-joined set representation: members trimmed, empties dropped,
// first occurrence wins so arrival order is kept.
fn join_set<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut members: Vec<&str> = Vec::new();
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !members.contains(&value) {
            members.push(value);
        }
    }
    members.join(",")
}

/// Create a run row, or merge into the existing one when the id is already
/// registered.
///
/// Merge semantics never shrink a run: platform and keyword sets union with
/// what is already stored, `count` takes the larger value, and `started_at`
/// keeps the earliest timestamp. Set members are whitespace-trimmed and
/// de-duplicated on every write, so `" rust "` and `"rust"` are one member
/// no matter which call site supplied them. When `run_id` is `None` a new id of the
/// form `<epoch_millis>-<platform>` (or `<epoch_millis>-run` for
/// multi-platform runs) is generated.
///
/// Returns the run id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn create_or_merge_run(
    pool: &PgPool,
    run_id: Option<&str>,
    platforms: &[Platform],
    keywords: &[String],
    count: i32,
) -> Result<String, DbError> {
    let id = run_id.map_or_else(|| generate_run_id(platforms), ToString::to_string);
    let platforms_joined = join_set(platforms.iter().map(|p| p.as_str()));
    let keywords_joined = join_set(keywords.iter().map(String::as_str));

    let sql = format!(
        "INSERT INTO sourcing_runs (id, platforms, keywords, count, started_at) \
         VALUES ($1, $2, $3, $4, NOW()) \
         ON CONFLICT (id) DO UPDATE SET \
           platforms = {platforms_merge}, \
           keywords = {keywords_merge}, \
           count = GREATEST(sourcing_runs.count, EXCLUDED.count), \
           started_at = LEAST(sourcing_runs.started_at, EXCLUDED.started_at)",
        platforms_merge = merge_set_sql("platforms"),
        keywords_merge = merge_set_sql("keywords"),
    );

    sqlx::query(&sql)
        .bind(&id)
        .bind(&platforms_joined)
        .bind(&keywords_joined)
        .bind(count)
        .execute(pool)
        .await?;

    Ok(id)
}

/// List the most recent runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<SourcingRunRow>, DbError> {
    let rows = sqlx::query_as::<_, SourcingRunRow>(
        "SELECT id, platforms, keywords, count, started_at \
         FROM sourcing_runs \
         ORDER BY started_at DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete a run and every post it ingested, atomically.
///
/// The registry row and the per-platform post rows go in one transaction;
/// either everything is removed or nothing is.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no run with this id exists (no posts are
/// touched in that case), or [`DbError::Sqlx`] on query failure.
pub async fn delete_run(pool: &PgPool, run_id: &str) -> Result<DeletedCounts, DbError> {
    let mut tx = pool.begin().await?;

    let deleted_run = sqlx::query("DELETE FROM sourcing_runs WHERE id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    if deleted_run.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::NotFound);
    }

    let mut counts = DeletedCounts::default();
    for platform in Platform::ALL {
        let table = table_for(platform);
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE run_id = $1"))
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        counts.record(platform, result.rows_affected());
    }

    tx.commit().await?;
    info!(run_id, deleted = counts.total(), "deleted sourcing run");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_suffix_uses_platform_when_single() {
        let id = generate_run_id(&[Platform::Youtube]);
        assert!(id.ends_with("-youtube"), "got: {id}");
    }

    #[test]
    fn run_id_suffix_is_run_when_multi() {
        let id = generate_run_id(&[Platform::Tiktok, Platform::Twitter]);
        assert!(id.ends_with("-run"), "got: {id}");
        let id = generate_run_id(&[]);
        assert!(id.ends_with("-run"), "got: {id}");
    }

    #[test]
    fn join_set_trims_dedups_and_keeps_order() {
        let joined = join_set([" rust ", "tokio", "rust", "  ", ""].into_iter());
        assert_eq!(joined, "rust,tokio");
    }

    #[test]
    fn row_list_helpers_skip_empty_segments() {
        let row = SourcingRunRow {
            id: "1-run".into(),
            platforms: "tiktok,,youtube".into(),
            keywords: String::new(),
            count: 10,
            started_at: None,
        };
        assert_eq!(row.platform_list(), vec!["tiktok", "youtube"]);
        assert!(row.keyword_list().is_empty());
    }

    #[test]
    fn deleted_counts_total_sums_platforms() {
        let mut counts = DeletedCounts::default();
        counts.record(Platform::Tiktok, 3);
        counts.record(Platform::Instagram, 2);
        assert_eq!(counts.total(), 5);
    }
}
