//! Scheduler-facing wrappers: resolve identity from config, run, log the outcome.

use tracing::{error, info, warn};

use crate::blog::{BlogApi, BlogClient};
use crate::config::Config;
use crate::db::{self, SqliteStore};
use crate::error::{Result, SyncError};
use crate::github::{GitHubApi, GitHubClient};
use crate::sync::{sync_blog, sync_github, SyncReport};

/// Open the configured database and bring its schema up to date.
pub async fn open_store(cfg: &Config) -> Result<SqliteStore> {
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    Ok(SqliteStore::new(pool))
}

pub fn github_client(cfg: &Config) -> Result<GitHubClient> {
    GitHubClient::new(
        &cfg.github.api_base,
        cfg.github_token(),
        cfg.request_timeout(),
        &cfg.http.user_agent,
    )
}

pub fn blog_client(cfg: &Config) -> Result<BlogClient> {
    BlogClient::new(
        &cfg.blog.devto_api_base,
        &cfg.blog.medium_feed_base,
        cfg.request_timeout(),
        &cfg.http.user_agent,
    )
}

/// One scheduled GitHub run. `None` when no run-log row was written.
pub async fn github_job(store: &SqliteStore, api: &dyn GitHubApi, cfg: &Config) -> Option<SyncReport> {
    let options = cfg.sync_options();
    let result = sync_github(store, store, api, &cfg.github.username, &options).await;
    log_outcome("github", result)
}

/// One scheduled blog run against Dev.to or Medium, whichever is configured.
pub async fn blog_job(store: &SqliteStore, api: &dyn BlogApi, cfg: &Config) -> Option<SyncReport> {
    let Some((source, username)) = cfg.blog_target() else {
        error!("blog sync skipped: neither blog.devto_username nor blog.medium_username is set");
        return None;
    };
    let options = cfg.sync_options();
    let result = sync_blog(store, store, api, source, &username, cfg.blog.limit, &options).await;
    log_outcome("blog", result)
}

fn log_outcome(job: &str, result: Result<SyncReport>) -> Option<SyncReport> {
    match result {
        Ok(report) if report.is_success() => {
            info!(
                job,
                run_id = report.run_id,
                created = report.created,
                updated = report.updated,
                skipped = report.skipped,
                "job finished"
            );
            Some(report)
        }
        Ok(report) => {
            warn!(job, run_id = report.run_id, error = ?report.error, "job recorded a failed run");
            Some(report)
        }
        Err(SyncError::AlreadyRunning(source)) => {
            warn!(job, %source, "job skipped: previous run still holds the lease");
            None
        }
        Err(err) => {
            error!(job, error = %err, "job not run");
            None
        }
    }
}
