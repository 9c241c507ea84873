use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use portfolio_sync::config::{self, Config};
use portfolio_sync::model::BlogSource;
use portfolio_sync::{jobs, sync_blog};

#[derive(Debug, Parser)]
#[command(author, version, about = "Run one Dev.to or Medium blog sync and exit")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Platform to pull from; defaults to whichever username the config sets
    #[arg(long, value_enum)]
    source: Option<BlogSource>,

    /// Author on the chosen platform (overrides the config username)
    #[arg(long)]
    username: Option<String>,

    /// Maximum number of posts to mirror (overrides blog.limit)
    #[arg(long)]
    limit: Option<u32>,
}

fn resolve_target(cfg: &Config, args: &Args) -> Option<(BlogSource, String)> {
    match (args.source, args.username.clone()) {
        (Some(source), Some(username)) => Some((source, username)),
        (Some(BlogSource::DevTo), None) => Some((BlogSource::DevTo, cfg.blog.devto_username.clone())),
        (Some(BlogSource::Medium), None) => {
            Some((BlogSource::Medium, cfg.blog.medium_username.clone()))
        }
        (None, Some(username)) => cfg
            .blog_target()
            .map(|(source, _)| (source, username)),
        (None, None) => cfg.blog_target(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let (source, username) = resolve_target(&cfg, &args)
        .context("no blog source configured; pass --source and --username")?;
    let limit = args.limit.unwrap_or(cfg.blog.limit);
    if limit == 0 {
        bail!("--limit must be > 0");
    }

    let store = jobs::open_store(&cfg).await?;
    let api = jobs::blog_client(&cfg)?;

    info!(?source, %username, limit, "running blog sync");
    let report = sync_blog(&store, &store, &api, source, &username, limit, &cfg.sync_options()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_success() {
        bail!(
            "sync run {} failed: {}",
            report.run_id,
            report.error.unwrap_or_default()
        );
    }
    Ok(())
}
