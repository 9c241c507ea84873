//! Run boundary shared by every source: lease, run-log row, cache invalidation.

use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{CacheInvalidator, SyncStore};
use crate::error::{Result, SyncError};
use crate::model::{RunStatus, SyncSource};

pub mod blog;
pub mod github;

pub use blog::sync_blog;
pub use github::sync_github;

/// Default lease lifetime when none is configured.
pub const DEFAULT_LEASE_SECONDS: i64 = 900;
/// Default run deadline; shorter than the default lease.
pub const DEFAULT_RUN_TIMEOUT_SECONDS: u64 = 600;

/// Point in time after which no further request is started.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn after(limit: Option<Duration>) -> Self {
        Deadline(limit.map(|d| Instant::now() + d))
    }

    /// Called before each outbound request; `stage` names that request.
    pub fn check(&self, stage: &str) -> Result<()> {
        match self.0 {
            Some(at) if Instant::now() >= at => Err(SyncError::DeadlineExceeded(stage.to_string())),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Also mirror repositories that are forks.
    pub include_forks: bool,
    /// Must stay below `lease_ttl` minus one request timeout, or a slow run
    /// can outlive its lease.
    pub deadline: Option<Duration>,
    pub lease_ttl: chrono::Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include_forks: false,
            deadline: Some(Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECONDS)),
            lease_ttl: chrono::Duration::seconds(DEFAULT_LEASE_SECONDS),
        }
    }
}

/// Per-run tallies written to the run log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
}

impl RunCounts {
    pub fn record(&mut self, was_created: bool) {
        if was_created {
            self.created += 1;
        } else {
            self.updated += 1;
        }
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }
}

/// Outcome of one logged run, mirroring its run-log row.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub run_id: i64,
    pub source: SyncSource,
    pub status: RunStatus,
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
    pub error: Option<String>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Execute `body` as one logged run of `source`.
///
/// Errors before the run-log row exists (lease held elsewhere, store down)
/// are returned as `Err`. Once the row exists, a failing body is recorded as
/// a failed run and reported through `Ok(SyncReport)`. If the success write
/// itself fails, the row is marked failed and the write error is returned.
pub(crate) async fn run_logged<F, Fut>(
    store: &dyn SyncStore,
    cache: &dyn CacheInvalidator,
    source: SyncSource,
    options: &SyncOptions,
    body: F,
) -> Result<SyncReport>
where
    F: FnOnce(Deadline) -> Fut,
    Fut: Future<Output = Result<RunCounts>>,
{
    let holder = Uuid::new_v4().to_string();
    if !store.acquire_lease(source, &holder, options.lease_ttl).await? {
        warn!(%source, "sync already running, skipping");
        return Err(SyncError::AlreadyRunning(source));
    }

    let outcome = run_with_lease(store, cache, source, options, body).await;

    if let Err(err) = store.release_lease(source, &holder).await {
        warn!(%source, ?err, "failed to release sync lease; it will expire");
    }
    outcome
}

async fn run_with_lease<F, Fut>(
    store: &dyn SyncStore,
    cache: &dyn CacheInvalidator,
    source: SyncSource,
    options: &SyncOptions,
    body: F,
) -> Result<SyncReport>
where
    F: FnOnce(Deadline) -> Fut,
    Fut: Future<Output = Result<RunCounts>>,
{
    let run_id = store.start_run(source).await?;
    info!(%source, run_id, "sync run started");

    match body(Deadline::after(options.deadline)).await {
        Ok(counts) => {
            let finished = store
                .finish_run(run_id, counts.created, counts.updated, counts.skipped)
                .await;
            if let Err(err) = finished {
                if !matches!(err, SyncError::RunAlreadyFinished(_)) {
                    error!(%source, run_id, error = %err, "could not record success, marking run failed");
                    if let Err(fail_err) = store.fail_run(run_id, &err.to_string()).await {
                        error!(%source, run_id, error = %fail_err, "could not mark run failed");
                    }
                }
                return Err(err);
            }
            if let Err(err) = cache.invalidate(source.cache_key()).await {
                warn!(%source, key = source.cache_key(), ?err, "cache invalidation failed");
            }
            info!(
                %source,
                run_id,
                created = counts.created,
                updated = counts.updated,
                skipped = counts.skipped,
                "sync run succeeded"
            );
            Ok(SyncReport {
                run_id,
                source,
                status: RunStatus::Success,
                created: counts.created,
                updated: counts.updated,
                skipped: counts.skipped,
                error: None,
            })
        }
        Err(err) => {
            let message = err.to_string();
            error!(%source, run_id, error = %message, "sync run failed");
            store.fail_run(run_id, &message).await?;
            Ok(SyncReport {
                run_id,
                source,
                status: RunStatus::Failed,
                created: 0,
                updated: 0,
                skipped: 0,
                error: Some(message),
            })
        }
    }
}

/// Unwrap a mapped record, or count it as skipped when only that record is bad.
pub(crate) fn record_or_skip<T>(result: Result<T>, counts: &mut RunCounts) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_record_error() => {
            warn!(error = %err, "skipping malformed record");
            counts.skip();
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Trim `username` and reject it when empty. Nothing is written for a run
/// that never had an identity.
pub(crate) fn require_identity(source: SyncSource, username: &str) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        warn!(%source, "no username configured, sync not attempted");
        return Err(SyncError::Config(format!("no {source} username configured")));
    }
    Ok(username.to_string())
}
