mod admin;
mod discover;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sourcedb-cli")]
#[command(about = "Social post sourcing command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Source posts for keywords across one or more platforms.
    Discover {
        /// Platforms to source from (tiktok, youtube, twitter, instagram).
        #[arg(long, value_delimiter = ',', required = true)]
        platforms: Vec<String>,
        /// Keywords to search for.
        #[arg(long, value_delimiter = ',', required = true)]
        keywords: Vec<String>,
        /// Posts wanted per keyword.
        #[arg(long, default_value_t = 20)]
        count: usize,
        /// Merge results into an existing run instead of starting a new one.
        #[arg(long)]
        run_id: Option<String>,
        /// Print what would be sourced without calling any provider.
        #[arg(long)]
        dry_run: bool,
    },
    /// List registered sourcing runs.
    Runs {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Delete a run and every post it sourced.
    DeleteRun {
        run_id: String,
    },
    /// Print stored posts as JSON lines, newest first.
    Posts {
        /// Platform to read, or `all`.
        #[arg(long, default_value = "all")]
        platform: String,
        #[arg(long, default_value_t = 50)]
        count: i64,
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = sourcedb_core::load_app_config_from_env()?;
    let pool = sourcedb_db::connect_pool(
        &config.database_url,
        sourcedb_db::PoolConfig::from_app_config(&config),
    )
    .await?;
    sourcedb_db::run_migrations(&pool).await?;

    match cli.command {
        Commands::Discover {
            platforms,
            keywords,
            count,
            run_id,
            dry_run,
        } => {
            discover::run_discover(&pool, &config, &platforms, keywords, count, run_id, dry_run)
                .await
        }
        Commands::Runs { limit } => admin::run_list_runs(&pool, limit).await,
        Commands::DeleteRun { run_id } => admin::run_delete_run(&pool, &run_id).await,
        Commands::Posts {
            platform,
            count,
            run_id,
        } => admin::run_posts(&pool, &platform, count, run_id.as_deref()).await,
    }
}
