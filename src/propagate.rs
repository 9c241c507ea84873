use chrono::Utc;
use tracing::debug;

use crate::db::model::ProjectStats;
use crate::db::SyncStore;
use crate::error::Result;
use crate::model::Repository;

/// Copy a repository's stars and forks onto every project whose `github_url`
/// contains its `full_name`. Returns how many projects were touched; zero is fine.
pub async fn propagate_repo_stats(store: &dyn SyncStore, repo: &Repository) -> Result<usize> {
    let projects = store.find_dependents_by_url_fragment(&repo.full_name).await?;
    let seed_language = Some(repo.primary_language.trim().to_string()).filter(|l| !l.is_empty());
    let stats = ProjectStats {
        stars_count: repo.stars_count,
        forks_count: repo.forks_count,
        synced_at: Utc::now(),
        seed_language,
    };
    for project in &projects {
        store.update_project_stats(project.id, &stats).await?;
        debug!(project_id = project.id, full_name = %repo.full_name, "propagated repo stats");
    }
    Ok(projects.len())
}
