use crate::cache::CacheStore;
use crate::collect::{BarProgress, Collector, NoProgress, ProgressSink};
use crate::config::{default_cache_dir, resolve_token, CollectOptions, DEFAULT_BATCH_SIZE, DEFAULT_CACHE_MAX_AGE_HOURS};
use crate::error::WrappedError;
use crate::github::{GitHubClient, DEFAULT_API_URL};
use crate::model::FilterSet;
use crate::output;
use crate::stats::{analyze_messages, compute_statistics_in, language_map, DEFAULT_TOP_N};
use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use clap::{ArgAction, Args, Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "ghwrapped")]
#[command(about = "Year-in-review statistics for a GitHub account's commits")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Calendar year to analyze (default: current year; `cache clear`: every year)")]
    pub year: Option<i32>,

    #[arg(long, global = true, help = "GitHub login to analyze (default: the token's owner; `cache clear`: every login)")]
    pub user: Option<String>,

    #[arg(long, global = true, help = "Access token (falls back to GITHUB_TOKEN, then GH_TOKEN)")]
    pub token: Option<String>,

    #[arg(long, global = true, help = "Skip private repositories")]
    pub public_only: bool,

    #[arg(long = "exclude", global = true, value_name = "OWNER/NAME", help = "Exclude a repository (repeatable)")]
    pub exclude: Vec<String>,

    #[arg(long, global = true, value_name = "OWNER/NAME", help = "Analyze a single repository")]
    pub repo: Option<String>,

    #[arg(long, global = true, default_value_t = DEFAULT_BATCH_SIZE, help = "Repositories fetched concurrently")]
    pub batch_size: usize,

    #[arg(long, global = true, help = "Ignore cached data and refetch")]
    pub refresh: bool,

    #[arg(long, global = true, default_value_t = DEFAULT_CACHE_MAX_AGE_HOURS, value_name = "HOURS", help = "Maximum cache age in hours")]
    pub cache_max_age: f64,

    #[arg(long, global = true, help = "Path to cache directory")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value = DEFAULT_API_URL, help = "GitHub API base URL")]
    pub api_url: String,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "More log output (-v, -vv)")]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect the year's commits and print statistics
    Stats {
        #[arg(long, help = "Output as JSON")]
        json: bool,

        #[arg(long, default_value_t = DEFAULT_TOP_N, help = "Number of top repositories")]
        top: usize,

        #[arg(long, help = "Disable the progress bar")]
        no_progress: bool,
    },
    /// Inspect or clear cached collections
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// List cached entries and their age
    Status,
    /// Delete cached entries, narrowed by --user and --year
    Clear,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn execute(self) -> Result<()> {
        let cache = CacheStore::new(self.common.cache_dir.clone().unwrap_or_else(default_cache_dir));
        match self.command {
            Commands::Stats { json, top, no_progress } => {
                stats(&self.common, &cache, json, top, no_progress).await
            }
            Commands::Cache { action: CacheCommand::Status } => {
                let listings = cache.entries().await.context("Failed to read cache directory")?;
                output::output_cache_status(cache.dir(), &listings, self.common.cache_max_age);
                Ok(())
            }
            Commands::Cache { action: CacheCommand::Clear } => {
                let deleted = cache
                    .clear(self.common.user.as_deref(), self.common.year)
                    .await
                    .context("Failed to clear cache")?;
                output::output_cleared(&deleted);
                Ok(())
            }
        }
    }
}

async fn stats(common: &CommonArgs, cache: &CacheStore, json: bool, top: usize, no_progress: bool) -> Result<()> {
    let token = resolve_token(common.token.as_deref()).ok_or(WrappedError::MissingToken)?;
    let client = client(&common.api_url, &token)?;

    let principal = match &common.user {
        Some(user) => user.clone(),
        None => client
            .authenticated_login()
            .await
            .context("Failed to resolve the authenticated user")?,
    };
    let options = CollectOptions {
        principal: principal.clone(),
        year: common.year.unwrap_or_else(|| Local::now().year()),
        filters: FilterSet::new(common.public_only, common.exclude.iter().cloned()),
        explicit_repo: common.repo.clone(),
        batch_size: common.batch_size,
        use_cache: !common.refresh,
        cache_max_age_hours: common.cache_max_age,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupted; stopping after the current batch (press Ctrl-C again to abort)");
        on_interrupt.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let bar;
    let progress: &dyn ProgressSink = if no_progress || json {
        &NoProgress
    } else {
        bar = BarProgress::new();
        &bar
    };

    let collection = Collector::new(&client, cache)
        .with_progress(progress)
        .with_cancellation(cancel)
        .collect(&options)
        .await
        .with_context(|| format!("Failed to collect commits for {} in {}", principal, options.year))?;
    info!(
        commits = collection.commits.len(),
        batches = collection.batches,
        from_cache = collection.from_cache,
        "collection finished"
    );

    let statistics = compute_statistics_in(&collection.commits, &language_map(&collection.repos), top, &Local);
    let messages = analyze_messages(&collection.commits);
    let doc = output::build_output(&principal, options.year, &collection, statistics, messages);

    if json {
        output::output_json(&doc)
    } else {
        output::output_summary(&doc)
    }
}

fn client(api_url: &str, token: &str) -> Result<GitHubClient> {
    let mut base = Url::parse(api_url).with_context(|| format!("Invalid --api-url: {api_url}"))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(GitHubClient::with_base_url(base, token)?)
}
