use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

use portfolio_sync::{config, jobs};

#[derive(Debug, Parser)]
#[command(author, version, about = "Periodically mirror GitHub repositories and blog posts")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let store = jobs::open_store(&cfg).await?;
    let github = jobs::github_client(&cfg)?;
    let blog = jobs::blog_client(&cfg)?;

    let mut github_tick = tokio::time::interval(Duration::from_secs(cfg.github.interval_seconds));
    github_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut blog_tick = tokio::time::interval(Duration::from_secs(cfg.blog.interval_seconds));
    blog_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        github_every = cfg.github.interval_seconds,
        blog_every = cfg.blog.interval_seconds,
        "starting sync scheduler"
    );

    // Jobs run inside the select arms, so at most one run is active at a time.
    loop {
        tokio::select! {
            _ = github_tick.tick() => {
                jobs::github_job(&store, &github, &cfg).await;
            }
            _ = blog_tick.tick() => {
                jobs::blog_job(&store, &blog, &cfg).await;
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("shutdown requested");
                break;
            }
        }
    }

    store.pool().close().await;
    Ok(())
}
