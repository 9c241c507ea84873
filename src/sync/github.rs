use futures::TryStreamExt;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use super::{record_or_skip, require_identity, run_logged, Deadline, RunCounts, SyncOptions, SyncReport};
use crate::db::{CacheInvalidator, SyncStore};
use crate::error::Result;
use crate::github::{repo_records, GitHubApi};
use crate::mapper::{map_repo, parse_repo_record};
use crate::model::SyncSource;
use crate::propagate::propagate_repo_stats;
use crate::reconcile::reconcile_repo;

/// Mirror every public repository of `username` and push the fresh stats to
/// linked projects. The optional credential lives in the `api` client.
#[instrument(skip_all, fields(username = %username))]
pub async fn sync_github(
    store: &dyn SyncStore,
    cache: &dyn CacheInvalidator,
    api: &dyn GitHubApi,
    username: &str,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let username = require_identity(SyncSource::GitHub, username)?;
    run_logged(store, cache, SyncSource::GitHub, options, |deadline| {
        mirror_repos(store, api, &username, options.include_forks, deadline)
    })
    .await
}

async fn mirror_repos(
    store: &dyn SyncStore,
    api: &dyn GitHubApi,
    username: &str,
    include_forks: bool,
    deadline: Deadline,
) -> Result<RunCounts> {
    let mut counts = RunCounts::default();
    let mut linked_projects = 0usize;
    let mut records = Box::pin(repo_records(api, username, deadline));

    while let Some(raw) = records.try_next().await? {
        let Some(record) = record_or_skip(parse_repo_record(&raw), &mut counts)? else {
            continue;
        };
        if record.fork && !include_forks {
            debug!(full_name = %record.full_name, "ignoring fork");
            continue;
        }

        let languages = match record.languages_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => {
                deadline.check(&format!("fetching languages of {}", record.full_name))?;
                api.languages(url).await?
            }
            None => BTreeMap::new(),
        };
        let Some(fields) = record_or_skip(map_repo(&record, languages), &mut counts)? else {
            continue;
        };

        let (repo, created) = reconcile_repo(store, &fields).await?;
        counts.record(created);
        linked_projects += propagate_repo_stats(store, &repo).await?;
    }

    info!(linked_projects, "repository stats propagated");
    Ok(counts)
}
