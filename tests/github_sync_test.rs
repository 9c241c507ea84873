use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use portfolio_sync::db::{
    self, BlogPostFields, NewProject, ProjectStats, RepoFields, SqliteStore, SyncStore,
};
use portfolio_sync::github::{ExternalRecord, GitHubApi};
use portfolio_sync::model::{BlogPost, Project, Repository, RunStatus, SyncSource, LATEST_GITHUB_REPOS};
use portfolio_sync::{sync_github, SyncError, SyncOptions};

async fn setup_store() -> SqliteStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    SqliteStore::new(pool)
}

#[derive(Clone, Default)]
struct RecordingGitHub {
    pages: Arc<Mutex<VecDeque<portfolio_sync::Result<Vec<ExternalRecord>>>>>,
    page_calls: Arc<Mutex<Vec<(String, u32)>>>,
    language_calls: Arc<Mutex<Vec<String>>>,
    page_delay: Duration,
}

impl RecordingGitHub {
    fn with_pages(pages: Vec<portfolio_sync::Result<Vec<ExternalRecord>>>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(VecDeque::from(pages))),
            ..Default::default()
        }
    }

    async fn page_calls(&self) -> Vec<(String, u32)> {
        self.page_calls.lock().await.clone()
    }

    async fn language_calls(&self) -> Vec<String> {
        self.language_calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl GitHubApi for RecordingGitHub {
    async fn list_repos_page(
        &self,
        username: &str,
        page: u32,
    ) -> portfolio_sync::Result<Vec<ExternalRecord>> {
        self.page_calls.lock().await.push((username.to_string(), page));
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
        self.pages.lock().await.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn languages(&self, languages_url: &str) -> portfolio_sync::Result<BTreeMap<String, i64>> {
        self.language_calls.lock().await.push(languages_url.to_string());
        Ok(BTreeMap::from([("Rust".to_string(), 12_000), ("Shell".to_string(), 300)]))
    }
}

/// Delegates to SQLite but refuses to record a successful run.
struct SuccessWriteFails {
    inner: SqliteStore,
}

#[async_trait::async_trait]
impl SyncStore for SuccessWriteFails {
    async fn find_repository(&self, full_name: &str) -> portfolio_sync::Result<Option<Repository>> {
        self.inner.find_repository(full_name).await
    }

    async fn upsert_repository(
        &self,
        fields: &RepoFields,
        synced_at: chrono::DateTime<chrono::Utc>,
    ) -> portfolio_sync::Result<(Repository, bool)> {
        self.inner.upsert_repository(fields, synced_at).await
    }

    async fn find_post(
        &self,
        source: SyncSource,
        external_id: &str,
    ) -> portfolio_sync::Result<Option<BlogPost>> {
        self.inner.find_post(source, external_id).await
    }

    async fn upsert_post(
        &self,
        fields: &BlogPostFields,
        synced_at: chrono::DateTime<chrono::Utc>,
    ) -> portfolio_sync::Result<(BlogPost, bool)> {
        self.inner.upsert_post(fields, synced_at).await
    }

    async fn slug_owner(&self, slug: &str) -> portfolio_sync::Result<Option<i64>> {
        self.inner.slug_owner(slug).await
    }

    async fn find_dependents_by_url_fragment(&self, fragment: &str) -> portfolio_sync::Result<Vec<Project>> {
        self.inner.find_dependents_by_url_fragment(fragment).await
    }

    async fn update_project_stats(&self, project_id: i64, stats: &ProjectStats) -> portfolio_sync::Result<()> {
        self.inner.update_project_stats(project_id, stats).await
    }

    async fn start_run(&self, source: SyncSource) -> portfolio_sync::Result<i64> {
        self.inner.start_run(source).await
    }

    async fn finish_run(
        &self,
        _run_id: i64,
        _created: i64,
        _updated: i64,
        _skipped: i64,
    ) -> portfolio_sync::Result<()> {
        Err(SyncError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn fail_run(&self, run_id: i64, error_text: &str) -> portfolio_sync::Result<()> {
        self.inner.fail_run(run_id, error_text).await
    }

    async fn acquire_lease(
        &self,
        source: SyncSource,
        holder: &str,
        ttl: chrono::Duration,
    ) -> portfolio_sync::Result<bool> {
        self.inner.acquire_lease(source, holder, ttl).await
    }

    async fn release_lease(&self, source: SyncSource, holder: &str) -> portfolio_sync::Result<()> {
        self.inner.release_lease(source, holder).await
    }
}

fn repo(full_name: &str, stars: i64) -> Value {
    let name = full_name.split('/').last().unwrap();
    json!({
        "name": name,
        "full_name": full_name,
        "description": format!("{name} description"),
        "html_url": format!("https://github.com/{full_name}"),
        "clone_url": format!("https://github.com/{full_name}.git"),
        "homepage": null,
        "stargazers_count": stars,
        "forks_count": 1,
        "watchers_count": stars,
        "open_issues_count": 0,
        "language": "Rust",
        "fork": false,
        "languages_url": format!("https://api.github.com/repos/{full_name}/languages"),
        "created_at": "2023-05-01T08:00:00Z",
        "updated_at": "2024-02-01T08:00:00Z",
        "pushed_at": "2024-02-02T08:00:00Z"
    })
}

async fn add_project(store: &SqliteStore, slug: &str, github_url: &str) -> i64 {
    db::insert_project(
        store.pool(),
        &NewProject {
            title: slug.to_string(),
            slug: slug.to_string(),
            github_url: github_url.to_string(),
            technical_stack: Vec::new(),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn end_to_end_creates_repos_and_updates_linked_project() {
    let store = setup_store().await;
    let project_id = add_project(&store, "app", "https://github.com/alice/app").await;
    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 10), repo("alice/lib", 3)])]);

    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!((report.created, report.updated, report.skipped), (2, 0, 0));

    let repos = db::list_repositories(store.pool()).await.unwrap();
    assert_eq!(repos.len(), 2);
    let app = db::find_repository(store.pool(), "alice/app").await.unwrap().unwrap();
    assert_eq!(app.stars_count, 10);
    assert_eq!(app.homepage, "");
    assert_eq!(app.languages.get("Rust"), Some(&12_000));

    let project = db::get_project(store.pool(), project_id).await.unwrap().unwrap();
    assert_eq!(project.stars_count, 10);
    assert_eq!(project.forks_count, 1);
    assert_eq!(project.technical_stack, vec!["Rust".to_string()]);
    assert!(project.last_github_sync.is_some());

    let run = db::get_run(store.pool(), report.run_id).await.unwrap().unwrap();
    assert_eq!(run.source, SyncSource::GitHub);
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!((run.items_created, run.items_updated), (2, 0));
    assert!(run.finished_at.is_some());

    // Page 2 came back empty and ended the listing.
    assert_eq!(
        api.page_calls().await,
        vec![("alice".to_string(), 1), ("alice".to_string(), 2)]
    );
    assert_eq!(api.language_calls().await.len(), 2);
}

#[tokio::test]
async fn rerun_updates_in_place_without_duplicates() {
    let store = setup_store().await;
    let first = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 10), repo("alice/lib", 3)])]);
    sync_github(&store, &store, &first, "alice", &SyncOptions::default())
        .await
        .unwrap();
    let before = db::find_repository(store.pool(), "alice/app").await.unwrap().unwrap();

    let second = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 42), repo("alice/lib", 3)])]);
    let report = sync_github(&store, &store, &second, "alice", &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!((report.created, report.updated), (0, 2));
    let repos = db::list_repositories(store.pool()).await.unwrap();
    assert_eq!(repos.len(), 2);
    let after = db::find_repository(store.pool(), "alice/app").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.stars_count, 42);
}

#[tokio::test]
async fn paginates_until_empty_page() {
    let store = setup_store().await;
    let api = RecordingGitHub::with_pages(vec![
        Ok(vec![repo("alice/one", 1)]),
        Ok(vec![repo("alice/two", 2)]),
    ]);

    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.created, 2);
    let pages: Vec<u32> = api.page_calls().await.into_iter().map(|(_, p)| p).collect();
    assert_eq!(pages, vec![1, 2, 3]);
}

#[tokio::test]
async fn transport_failure_marks_run_failed() {
    let store = setup_store().await;
    let api = RecordingGitHub::with_pages(vec![Err(SyncError::Transport(
        "github error 503 Service Unavailable".into(),
    ))]);

    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.as_deref().unwrap().contains("503"));
    assert!(db::list_repositories(store.pool()).await.unwrap().is_empty());

    let runs = db::list_runs(store.pool(), Some(SyncSource::GitHub), 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error_message.contains("503"));
    assert!(runs[0].finished_at.is_some());
}

#[tokio::test]
async fn failure_mid_listing_keeps_earlier_upserts() {
    let store = setup_store().await;
    let api = RecordingGitHub::with_pages(vec![
        Ok(vec![repo("alice/app", 10)]),
        Err(SyncError::Transport("timed out".into())),
    ]);

    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(db::list_repositories(store.pool()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn propagation_matches_by_substring_only() {
    let store = setup_store().await;
    let app = add_project(&store, "app", "https://github.com/Alice/App").await;
    let extra = add_project(&store, "app-extra", "https://github.com/alice/app-extra").await;
    let other = add_project(&store, "other", "https://github.com/bob/other").await;

    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 7)])]);
    sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    for id in [app, extra] {
        let project = db::get_project(store.pool(), id).await.unwrap().unwrap();
        assert_eq!(project.stars_count, 7);
    }
    let untouched = db::get_project(store.pool(), other).await.unwrap().unwrap();
    assert_eq!(untouched.stars_count, 0);
    assert!(untouched.last_github_sync.is_none());
}

#[tokio::test]
async fn existing_stack_is_not_overwritten() {
    let store = setup_store().await;
    let id = db::insert_project(
        store.pool(),
        &NewProject {
            title: "app".into(),
            slug: "app".into(),
            github_url: "https://github.com/alice/app".into(),
            technical_stack: vec!["Rust".into(), "SQLite".into()],
        },
    )
    .await
    .unwrap();

    let mut record = repo("alice/app", 5);
    record["language"] = json!("Go");
    let api = RecordingGitHub::with_pages(vec![Ok(vec![record])]);
    sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    let project = db::get_project(store.pool(), id).await.unwrap().unwrap();
    assert_eq!(project.technical_stack, vec!["Rust".to_string(), "SQLite".to_string()]);
    assert_eq!(project.stars_count, 5);
}

#[tokio::test]
async fn forks_are_ignored_unless_enabled() {
    let store = setup_store().await;
    let mut fork = repo("alice/forked", 100);
    fork["fork"] = json!(true);

    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 1), fork.clone()])]);
    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!((report.created, report.skipped), (1, 0));
    assert!(db::find_repository(store.pool(), "alice/forked").await.unwrap().is_none());

    let api = RecordingGitHub::with_pages(vec![Ok(vec![fork])]);
    let options = SyncOptions {
        include_forks: true,
        ..SyncOptions::default()
    };
    let report = sync_github(&store, &store, &api, "alice", &options).await.unwrap();
    assert_eq!(report.created, 1);
    assert!(db::find_repository(store.pool(), "alice/forked").await.unwrap().is_some());
}

#[tokio::test]
async fn malformed_record_is_skipped_and_counted() {
    let store = setup_store().await;
    let mut broken = repo("alice/broken", 1);
    broken.as_object_mut().unwrap().remove("html_url");
    let mut bad_date = repo("alice/dated", 1);
    bad_date["created_at"] = json!("yesterday");

    let api = RecordingGitHub::with_pages(vec![Ok(vec![broken, repo("alice/app", 2), bad_date])]);
    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!((report.created, report.skipped), (1, 2));
    let run = db::get_run(store.pool(), report.run_id).await.unwrap().unwrap();
    assert_eq!(run.items_skipped, 2);
}

#[tokio::test]
async fn held_lease_rejects_run_without_log_row() {
    let store = setup_store().await;
    let held = db::acquire_lease(
        store.pool(),
        SyncSource::GitHub,
        "other-worker",
        chrono::Utc::now(),
        chrono::Duration::minutes(10),
    )
    .await
    .unwrap();
    assert!(held);

    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 1)])]);
    let err = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::AlreadyRunning(SyncSource::GitHub)));
    assert!(db::list_runs(store.pool(), None, 10).await.unwrap().is_empty());
    assert!(api.page_calls().await.is_empty());
}

#[tokio::test]
async fn lease_is_released_after_failed_run() {
    let store = setup_store().await;
    let api = RecordingGitHub::with_pages(vec![Err(SyncError::Transport("boom".into()))]);
    sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();

    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 1)])]);
    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());
}

#[tokio::test]
async fn missing_username_is_config_error_without_log_row() {
    let store = setup_store().await;
    let api = RecordingGitHub::default();

    let err = sync_github(&store, &store, &api, "  ", &SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
    assert!(db::list_runs(store.pool(), None, 10).await.unwrap().is_empty());
    assert!(api.page_calls().await.is_empty());
}

#[tokio::test]
async fn cache_is_cleared_only_after_success() {
    let store = setup_store().await;
    db::cache_put(store.pool(), LATEST_GITHUB_REPOS, "[]", chrono::Duration::hours(1))
        .await
        .unwrap();

    let failing = RecordingGitHub::with_pages(vec![Err(SyncError::Transport("down".into()))]);
    sync_github(&store, &store, &failing, "alice", &SyncOptions::default())
        .await
        .unwrap();
    assert!(db::cache_get(store.pool(), LATEST_GITHUB_REPOS).await.unwrap().is_some());

    let ok = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 1)])]);
    sync_github(&store, &store, &ok, "alice", &SyncOptions::default())
        .await
        .unwrap();
    assert!(db::cache_get(store.pool(), LATEST_GITHUB_REPOS).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_deadline_fails_before_fetching() {
    let store = setup_store().await;
    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 1)])]);
    let options = SyncOptions {
        deadline: Some(Duration::ZERO),
        ..SyncOptions::default()
    };

    let report = sync_github(&store, &store, &api, "alice", &options).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.unwrap().contains("deadline"));
    assert!(api.page_calls().await.is_empty());
}

#[tokio::test]
async fn failed_success_write_still_closes_the_run() {
    let store = setup_store().await;
    let failing = SuccessWriteFails {
        inner: store.clone(),
    };
    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 1)])]);

    let err = sync_github(&failing, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Database(_)));

    let runs = db::list_runs(store.pool(), Some(SyncSource::GitHub), 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(!runs[0].error_message.is_empty());
    assert!(runs[0].finished_at.is_some());

    // The lease was released, so the next run can proceed.
    let api = RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 2)])]);
    let report = sync_github(&store, &store, &api, "alice", &SyncOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());
}

#[tokio::test]
async fn deadline_is_checked_before_language_fetches() {
    let store = setup_store().await;
    let api = RecordingGitHub {
        page_delay: Duration::from_millis(200),
        ..RecordingGitHub::with_pages(vec![Ok(vec![repo("alice/app", 1)])])
    };
    let options = SyncOptions {
        deadline: Some(Duration::from_millis(50)),
        ..SyncOptions::default()
    };

    let report = sync_github(&store, &store, &api, "alice", &options).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.unwrap().contains("languages of alice/app"));
    assert_eq!(api.page_calls().await.len(), 1);
    assert!(api.language_calls().await.is_empty());
    assert!(db::list_repositories(store.pool()).await.unwrap().is_empty());
}
