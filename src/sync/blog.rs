use tracing::{debug, instrument};

use super::{record_or_skip, require_identity, run_logged, Deadline, RunCounts, SyncOptions, SyncReport};
use crate::blog::{rss, BlogApi};
use crate::db::model::BlogPostFields;
use crate::db::{CacheInvalidator, SyncStore};
use crate::error::Result;
use crate::mapper::{map_devto_article, map_feed_entry};
use crate::model::{BlogSource, SyncSource};
use crate::reconcile::reconcile_post;

/// Mirror the latest `limit` posts of `username` on `source`.
#[instrument(skip_all, fields(source = ?source, username = %username, limit = limit))]
pub async fn sync_blog(
    store: &dyn SyncStore,
    cache: &dyn CacheInvalidator,
    api: &dyn BlogApi,
    source: BlogSource,
    username: &str,
    limit: u32,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let run_source = SyncSource::from(source);
    let username = require_identity(run_source, username)?;
    run_logged(store, cache, run_source, options, |deadline| {
        mirror_posts(store, api, source, &username, limit, deadline)
    })
    .await
}

async fn mirror_posts(
    store: &dyn SyncStore,
    api: &dyn BlogApi,
    source: BlogSource,
    username: &str,
    limit: u32,
    deadline: Deadline,
) -> Result<RunCounts> {
    deadline.check("fetching posts")?;
    let mapped: Vec<Result<BlogPostFields>> = match source {
        BlogSource::DevTo => api
            .devto_articles(username, limit)
            .await?
            .iter()
            .take(limit as usize)
            .map(|raw| map_devto_article(raw, username))
            .collect(),
        BlogSource::Medium => {
            let xml = api.medium_feed(username).await?;
            rss::parse_feed(&xml)?
                .iter()
                .take(limit as usize)
                .map(|entry| map_feed_entry(entry, username))
                .collect()
        }
    };
    debug!(count = mapped.len(), "fetched posts");

    let mut counts = RunCounts::default();
    for fields in mapped {
        let Some(fields) = record_or_skip(fields, &mut counts)? else {
            continue;
        };
        let (_, created) = reconcile_post(store, &fields).await?;
        counts.record(created);
    }
    Ok(counts)
}
