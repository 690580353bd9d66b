//! The discover command: wire up a source per requested platform and run a
//! sourcing pass. Platforms whose provider credentials are missing are
//! reported and skipped rather than aborting the run.

use sourcedb_core::{AppConfig, Platform};
use sourcedb_ingest::{
    sources::{InstagramMode, InstagramSource, TiktokSource, TwitterSource, YoutubeSource},
    DiscoverRequest, PlatformOutcome, PlatformSource,
};
use sourcedb_providers::{
    ApifyClient, BrightDataClient, DiscoveryFilters, ProviderError, TwitterFetcher,
};

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_discover(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    platforms: &[String],
    keywords: Vec<String>,
    count: usize,
    run_id: Option<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let platforms: Vec<Platform> = platforms
        .iter()
        .map(|s| Platform::parse(s))
        .collect::<Result<_, _>>()?;
    let keywords: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    anyhow::ensure!(!keywords.is_empty(), "at least one keyword is required");

    if dry_run {
        let names: Vec<&str> = platforms.iter().map(|p| p.as_str()).collect();
        println!(
            "dry-run: would source {count} posts per keyword for [{}] on [{}]",
            keywords.join(", "),
            names.join(", ")
        );
        return Ok(());
    }

    let mut sources: Vec<Box<dyn PlatformSource>> = Vec::new();
    for platform in &platforms {
        match build_source(config, *platform) {
            Ok(source) => sources.push(source),
            Err(e) => eprintln!("skipping {platform}: {e}"),
        }
    }
    anyhow::ensure!(!sources.is_empty(), "no requested platform is configured");

    let request = DiscoverRequest {
        platforms,
        keywords,
        count,
        run_id,
    };
    let refs: Vec<&dyn PlatformSource> = sources.iter().map(AsRef::as_ref).collect();
    let outcome = sourcedb_ingest::discover(pool, &refs, &request).await?;

    println!("run {}", outcome.run_id);
    for result in &outcome.outcomes {
        match result {
            PlatformOutcome::Fetched {
                platform, saved, raw, ..
            } => {
                println!("  {platform}: saved {saved} of {raw} raw items");
            }
            PlatformOutcome::Pending { platform, job } => match &job.snapshot_id {
                Some(id) => println!("  {platform}: pending, snapshot {id}"),
                None => println!("  {platform}: pending, no snapshot id yet"),
            },
            PlatformOutcome::Failed { platform, error } => {
                println!("  {platform}: failed: {error}");
            }
        }
    }
    println!("total saved: {}", outcome.total_saved());

    Ok(())
}

fn build_source(
    config: &AppConfig,
    platform: Platform,
) -> Result<Box<dyn PlatformSource>, ProviderError> {
    match platform {
        Platform::Tiktok => {
            let client = apify_client(config)?;
            Ok(Box::new(TiktokSource::new(
                client,
                config.apify_tiktok_actor.clone(),
            )))
        }
        Platform::Instagram => {
            let client = apify_client(config)?;
            Ok(Box::new(InstagramSource::new(
                client,
                config.apify_instagram_actor.clone(),
                config.instagram_session_id.clone(),
                InstagramMode::Hashtag,
            )))
        }
        Platform::Youtube => {
            let key = config
                .bright_data_api_key
                .as_deref()
                .ok_or(ProviderError::MissingConfig("BRIGHT_DATA_API_KEY"))?;
            let client = BrightDataClient::new(
                key,
                config.provider_request_timeout_secs,
                config.provider_poll_max_attempts,
                config.provider_poll_delay_secs,
            )?;
            Ok(Box::new(YoutubeSource::new(
                client,
                config.youtube_dataset_id.clone(),
                DiscoveryFilters::default(),
            )))
        }
        Platform::Twitter => {
            let fetcher = TwitterFetcher::new(
                &config.python_bin,
                &config.twitter_script,
                config.twitter_auth_token.as_deref(),
                config.twitter_ct0.as_deref(),
            )?;
            Ok(Box::new(TwitterSource::new(fetcher, "top".to_string())))
        }
    }
}

fn apify_client(config: &AppConfig) -> Result<ApifyClient, ProviderError> {
    let token = config
        .apify_token
        .as_deref()
        .ok_or(ProviderError::MissingConfig("APIFY_TOKEN"))?;
    ApifyClient::new(
        token,
        config.provider_request_timeout_secs,
        config.provider_poll_max_attempts,
        config.provider_poll_delay_secs,
    )
}
