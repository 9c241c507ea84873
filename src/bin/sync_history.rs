use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use portfolio_sync::model::SyncSource;
use portfolio_sync::{config, db, jobs};

#[derive(Debug, Parser)]
#[command(author, version, about = "Print the most recent sync runs")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Only show runs of this source (github, devto, medium)
    #[arg(long)]
    source: Option<String>,

    /// Number of runs to show
    #[arg(long, default_value = "20")]
    limit: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let source = match args.source.as_deref() {
        Some(raw) => Some(
            SyncSource::parse_source(raw).ok_or_else(|| anyhow!("unknown source {raw:?}"))?,
        ),
        None => None,
    };

    let cfg = config::load(Some(&args.config))?;
    let store = jobs::open_store(&cfg).await?;
    let runs = db::list_runs(store.pool(), source, args.limit).await?;

    if runs.is_empty() {
        println!("no sync runs recorded");
        return Ok(());
    }
    for run in runs {
        let finished = run
            .finished_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{:<5} {:<7} {:<11} created={} updated={} skipped={} started={} finished={}{}",
            run.id,
            run.source.as_str(),
            run.status.as_str(),
            run.items_created,
            run.items_updated,
            run.items_skipped,
            run.started_at.to_rfc3339(),
            finished,
            if run.error_message.is_empty() {
                String::new()
            } else {
                format!(" error={:?}", run.error_message)
            }
        );
    }
    Ok(())
}
