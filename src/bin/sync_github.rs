use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use portfolio_sync::{config, jobs, sync_github};

#[derive(Debug, Parser)]
#[command(author, version, about = "Run one GitHub repository sync and exit")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// GitHub user to mirror (overrides github.username)
    #[arg(long)]
    username: Option<String>,

    /// Personal access token (overrides github.token)
    #[arg(long)]
    token: Option<String>,

    /// Also mirror forked repositories
    #[arg(long)]
    include_forks: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    if let Some(username) = args.username {
        cfg.github.username = username;
    }
    if let Some(token) = args.token {
        cfg.github.token = token;
    }
    if args.include_forks {
        cfg.github.include_forks = true;
    }

    let store = jobs::open_store(&cfg).await?;
    let api = jobs::github_client(&cfg)?;

    info!(username = %cfg.github.username, "running GitHub sync");
    let report = sync_github(&store, &store, &api, &cfg.github.username, &cfg.sync_options()).await?;
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
