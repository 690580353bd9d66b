//! Run-registry and post-store commands for the CLI.

use sourcedb_core::Platform;
use sourcedb_db::PlatformFilter;

pub(crate) async fn run_list_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = sourcedb_db::list_runs(pool, limit.clamp(1, 200)).await?;
    if runs.is_empty() {
        println!("no sourcing runs registered");
        return Ok(());
    }

    for run in &runs {
        let started = run
            .started_at
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
        println!(
            "{}  started {}  count {}  platforms [{}]  keywords [{}]",
            run.id,
            started,
            run.count,
            run.platform_list().join(","),
            run.keyword_list().join(","),
        );
    }
    Ok(())
}

pub(crate) async fn run_delete_run(pool: &sqlx::PgPool, run_id: &str) -> anyhow::Result<()> {
    let deleted = sourcedb_db::delete_run(pool, run_id).await?;
    println!(
        "deleted run {run_id}: tiktok {} youtube {} twitter {} instagram {} (total {})",
        deleted.tiktok,
        deleted.youtube,
        deleted.twitter,
        deleted.instagram,
        deleted.total()
    );
    Ok(())
}

pub(crate) async fn run_posts(
    pool: &sqlx::PgPool,
    platform: &str,
    count: i64,
    run_id: Option<&str>,
) -> anyhow::Result<()> {
    let filter = if platform.eq_ignore_ascii_case("all") {
        PlatformFilter::All
    } else {
        PlatformFilter::One(Platform::parse(platform)?)
    };

    let rows = sourcedb_db::query_posts(pool, filter, run_id, count.clamp(1, 500), 0).await?;
    for row in &rows {
        println!("{}", serde_json::to_string(row)?);
    }
    tracing::info!(rows = rows.len(), "query complete");
    Ok(())
}
