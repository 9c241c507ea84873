use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::model::{BlogPostFields, ProjectStats, RepoFields};
use super::repo::{self, Pool};
use crate::error::Result;
use crate::model::{BlogPost, Project, Repository, SyncSource};

/// Persistence seam used by the reconciliation engine and the run boundary.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn find_repository(&self, full_name: &str) -> Result<Option<Repository>>;

    async fn upsert_repository(
        &self,
        fields: &RepoFields,
        synced_at: DateTime<Utc>,
    ) -> Result<(Repository, bool)>;

    async fn find_post(&self, source: SyncSource, external_id: &str) -> Result<Option<BlogPost>>;

    async fn upsert_post(
        &self,
        fields: &BlogPostFields,
        synced_at: DateTime<Utc>,
    ) -> Result<(BlogPost, bool)>;

    async fn slug_owner(&self, slug: &str) -> Result<Option<i64>>;

    async fn find_dependents_by_url_fragment(&self, fragment: &str) -> Result<Vec<Project>>;

    async fn update_project_stats(&self, project_id: i64, stats: &ProjectStats) -> Result<()>;

    async fn start_run(&self, source: SyncSource) -> Result<i64>;

    async fn finish_run(&self, run_id: i64, created: i64, updated: i64, skipped: i64)
        -> Result<()>;

    async fn fail_run(&self, run_id: i64, error_text: &str) -> Result<()>;

    async fn acquire_lease(&self, source: SyncSource, holder: &str, ttl: Duration) -> Result<bool>;

    async fn release_lease(&self, source: SyncSource, holder: &str) -> Result<()>;
}

/// Hook clearing cached "latest items" listings after a successful run.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn find_repository(&self, full_name: &str) -> Result<Option<Repository>> {
        repo::find_repository(&self.pool, full_name).await
    }

    async fn upsert_repository(
        &self,
        fields: &RepoFields,
        synced_at: DateTime<Utc>,
    ) -> Result<(Repository, bool)> {
        repo::upsert_repository(&self.pool, fields, synced_at).await
    }

    async fn find_post(&self, source: SyncSource, external_id: &str) -> Result<Option<BlogPost>> {
        repo::find_post(&self.pool, source, external_id).await
    }

    async fn upsert_post(
        &self,
        fields: &BlogPostFields,
        synced_at: DateTime<Utc>,
    ) -> Result<(BlogPost, bool)> {
        repo::upsert_post(&self.pool, fields, synced_at).await
    }

    async fn slug_owner(&self, slug: &str) -> Result<Option<i64>> {
        repo::slug_owner(&self.pool, slug).await
    }

    async fn find_dependents_by_url_fragment(&self, fragment: &str) -> Result<Vec<Project>> {
        repo::find_projects_by_url_fragment(&self.pool, fragment).await
    }

    async fn update_project_stats(&self, project_id: i64, stats: &ProjectStats) -> Result<()> {
        repo::update_project_stats(&self.pool, project_id, stats).await
    }

    async fn start_run(&self, source: SyncSource) -> Result<i64> {
        repo::start_run(&self.pool, source).await
    }

    async fn finish_run(
        &self,
        run_id: i64,
        created: i64,
        updated: i64,
        skipped: i64,
    ) -> Result<()> {
        repo::finish_run(&self.pool, run_id, created, updated, skipped).await
    }

    async fn fail_run(&self, run_id: i64, error_text: &str) -> Result<()> {
        repo::fail_run(&self.pool, run_id, error_text).await
    }

    async fn acquire_lease(&self, source: SyncSource, holder: &str, ttl: Duration) -> Result<bool> {
        repo::acquire_lease(&self.pool, source, holder, Utc::now(), ttl).await
    }

    async fn release_lease(&self, source: SyncSource, holder: &str) -> Result<()> {
        repo::release_lease(&self.pool, source, holder).await
    }
}

#[async_trait]
impl CacheInvalidator for SqliteStore {
    async fn invalidate(&self, key: &str) -> Result<()> {
        repo::cache_invalidate(&self.pool, key).await
    }
}
