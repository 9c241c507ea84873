use super::model::{BlogPostFields, NewProject, ProjectStats, RepoFields};
use crate::error::{Result, SyncError};
use crate::model::{BlogPost, Project, Repository, RunStatus, SyncRun, SyncSource};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

const REPO_COLUMNS: &str = "id, name, full_name, description, html_url, clone_url, homepage, \
     stars_count, forks_count, watchers_count, open_issues_count, primary_language, languages, \
     created_at_github, updated_at_github, pushed_at_github, last_synced";

const POST_COLUMNS: &str = "id, source, external_id, title, slug, external_url, excerpt, \
     cover_image, author_name, published_at, read_time_minutes, reactions_count, comments_count, \
     is_published, last_synced";

const PROJECT_COLUMNS: &str =
    "id, title, slug, github_url, technical_stack, stars_count, forks_count, last_github_sync";

const RUN_COLUMNS: &str = "id, source, status, items_created, items_updated, items_skipped, \
     error_message, started_at, finished_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        // Enable WAL and stricter durability.
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| SyncError::Database(sqlx::Error::Protocol(format!("cannot encode JSON column: {e}"))))
}

fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| SyncError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn repository_from_row(row: &SqliteRow) -> Result<Repository> {
    let languages: String = row.get("languages");
    Ok(Repository {
        id: row.get("id"),
        name: row.get("name"),
        full_name: row.get("full_name"),
        description: row.get("description"),
        html_url: row.get("html_url"),
        clone_url: row.get("clone_url"),
        homepage: row.get("homepage"),
        stars_count: row.get("stars_count"),
        forks_count: row.get("forks_count"),
        watchers_count: row.get("watchers_count"),
        open_issues_count: row.get("open_issues_count"),
        primary_language: row.get("primary_language"),
        languages: decode_json(&languages)?,
        created_at_github: row.get("created_at_github"),
        updated_at_github: row.get("updated_at_github"),
        pushed_at_github: row.get("pushed_at_github"),
        last_synced: row.get("last_synced"),
    })
}

fn post_from_row(row: &SqliteRow) -> Result<BlogPost> {
    let source: String = row.get("source");
    let source = SyncSource::parse_source(&source).ok_or_else(|| {
        SyncError::Database(sqlx::Error::Decode(
            format!("unknown blog source {source}").into(),
        ))
    })?;
    Ok(BlogPost {
        id: row.get("id"),
        source,
        external_id: row.get("external_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        external_url: row.get("external_url"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        author_name: row.get("author_name"),
        published_at: row.get("published_at"),
        read_time_minutes: row.get("read_time_minutes"),
        reactions_count: row.get("reactions_count"),
        comments_count: row.get("comments_count"),
        is_published: row.get("is_published"),
        last_synced: row.get("last_synced"),
    })
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    let stack: String = row.get("technical_stack");
    Ok(Project {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        github_url: row.get("github_url"),
        technical_stack: decode_json(&stack)?,
        stars_count: row.get("stars_count"),
        forks_count: row.get("forks_count"),
        last_github_sync: row.try_get("last_github_sync").ok().flatten(),
    })
}

fn run_from_row(row: &SqliteRow) -> Result<SyncRun> {
    let source: String = row.get("source");
    let status: String = row.get("status");
    let decode = |what: &str, value: &str| {
        SyncError::Database(sqlx::Error::Decode(format!("unknown {what} {value}").into()))
    };
    Ok(SyncRun {
        id: row.get("id"),
        source: SyncSource::parse_source(&source).ok_or_else(|| decode("source", &source))?,
        status: RunStatus::parse_status(&status).ok_or_else(|| decode("status", &status))?,
        items_created: row.get("items_created"),
        items_updated: row.get("items_updated"),
        items_skipped: row.get("items_skipped"),
        error_message: row.get("error_message"),
        started_at: row.get("started_at"),
        finished_at: row.try_get("finished_at").ok().flatten(),
    })
}

#[instrument(skip_all)]
pub async fn find_repository(pool: &Pool, full_name: &str) -> Result<Option<Repository>> {
    let row = sqlx::query(&format!(
        "SELECT {REPO_COLUMNS} FROM github_repos WHERE full_name = ?"
    ))
    .bind(full_name)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(repository_from_row).transpose()
}

/// Insert or overwrite the repository keyed by `full_name`.
/// Returns the stored row and whether it was newly created.
#[instrument(skip_all, fields(full_name = %fields.full_name))]
pub async fn upsert_repository(
    pool: &Pool,
    fields: &RepoFields,
    synced_at: DateTime<Utc>,
) -> Result<(Repository, bool)> {
    let languages = encode_json(&fields.languages)?;
    let mut tx = pool.begin().await?;
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM github_repos WHERE full_name = ?")
        .bind(&fields.full_name)
        .fetch_optional(&mut *tx)
        .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE github_repos SET name = ?, description = ?, html_url = ?, clone_url = ?, \
                 homepage = ?, stars_count = ?, forks_count = ?, watchers_count = ?, \
                 open_issues_count = ?, primary_language = ?, languages = ?, \
                 created_at_github = ?, updated_at_github = ?, pushed_at_github = ?, \
                 last_synced = ? WHERE id = ?",
            )
            .bind(&fields.name)
            .bind(&fields.description)
            .bind(&fields.html_url)
            .bind(&fields.clone_url)
            .bind(&fields.homepage)
            .bind(fields.stars_count)
            .bind(fields.forks_count)
            .bind(fields.watchers_count)
            .bind(fields.open_issues_count)
            .bind(&fields.primary_language)
            .bind(&languages)
            .bind(fields.created_at_github)
            .bind(fields.updated_at_github)
            .bind(fields.pushed_at_github)
            .bind(synced_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        }
        None => {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO github_repos (name, full_name, description, html_url, clone_url, \
                 homepage, stars_count, forks_count, watchers_count, open_issues_count, \
                 primary_language, languages, created_at_github, updated_at_github, \
                 pushed_at_github, last_synced) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&fields.name)
            .bind(&fields.full_name)
            .bind(&fields.description)
            .bind(&fields.html_url)
            .bind(&fields.clone_url)
            .bind(&fields.homepage)
            .bind(fields.stars_count)
            .bind(fields.forks_count)
            .bind(fields.watchers_count)
            .bind(fields.open_issues_count)
            .bind(&fields.primary_language)
            .bind(&languages)
            .bind(fields.created_at_github)
            .bind(fields.updated_at_github)
            .bind(fields.pushed_at_github)
            .bind(synced_at)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let row = sqlx::query(&format!("SELECT {REPO_COLUMNS} FROM github_repos WHERE id = ?"))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    let repo = repository_from_row(&row)?;
    tx.commit().await?;
    Ok((repo, existing.is_none()))
}

pub async fn list_repositories(pool: &Pool) -> Result<Vec<Repository>> {
    let rows = sqlx::query(&format!(
        "SELECT {REPO_COLUMNS} FROM github_repos ORDER BY stars_count DESC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(repository_from_row).collect()
}

#[instrument(skip_all)]
pub async fn find_post(
    pool: &Pool,
    source: SyncSource,
    external_id: &str,
) -> Result<Option<BlogPost>> {
    let row = sqlx::query(&format!(
        "SELECT {POST_COLUMNS} FROM blog_posts WHERE source = ? AND external_id = ?"
    ))
    .bind(source.as_str())
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(post_from_row).transpose()
}

/// Id of the post currently holding `slug`, if any.
pub async fn slug_owner(pool: &Pool, slug: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM blog_posts WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Insert or overwrite the post keyed by `(source, external_id)`.
#[instrument(skip_all, fields(source = %fields.source, external_id = %fields.external_id))]
pub async fn upsert_post(
    pool: &Pool,
    fields: &BlogPostFields,
    synced_at: DateTime<Utc>,
) -> Result<(BlogPost, bool)> {
    let mut tx = pool.begin().await?;
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM blog_posts WHERE source = ? AND external_id = ?",
    )
    .bind(fields.source.as_str())
    .bind(&fields.external_id)
    .fetch_optional(&mut *tx)
    .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE blog_posts SET title = ?, slug = ?, external_url = ?, excerpt = ?, \
                 cover_image = ?, author_name = ?, published_at = ?, read_time_minutes = ?, \
                 reactions_count = ?, comments_count = ?, is_published = 1, last_synced = ? \
                 WHERE id = ?",
            )
            .bind(&fields.title)
            .bind(&fields.slug)
            .bind(&fields.external_url)
            .bind(&fields.excerpt)
            .bind(&fields.cover_image)
            .bind(&fields.author_name)
            .bind(fields.published_at)
            .bind(fields.read_time_minutes)
            .bind(fields.reactions_count)
            .bind(fields.comments_count)
            .bind(synced_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        }
        None => {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO blog_posts (source, external_id, title, slug, external_url, excerpt, \
                 cover_image, author_name, published_at, read_time_minutes, reactions_count, \
                 comments_count, is_published, last_synced) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?) RETURNING id",
            )
            .bind(fields.source.as_str())
            .bind(&fields.external_id)
            .bind(&fields.title)
            .bind(&fields.slug)
            .bind(&fields.external_url)
            .bind(&fields.excerpt)
            .bind(&fields.cover_image)
            .bind(&fields.author_name)
            .bind(fields.published_at)
            .bind(fields.read_time_minutes)
            .bind(fields.reactions_count)
            .bind(fields.comments_count)
            .bind(synced_at)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM blog_posts WHERE id = ?"))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    let post = post_from_row(&row)?;
    tx.commit().await?;
    Ok((post, existing.is_none()))
}

pub async fn list_posts(pool: &Pool) -> Result<Vec<BlogPost>> {
    let rows = sqlx::query(&format!(
        "SELECT {POST_COLUMNS} FROM blog_posts ORDER BY published_at DESC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(post_from_row).collect()
}

pub async fn insert_project(pool: &Pool, project: &NewProject) -> Result<i64> {
    let stack = encode_json(&project.technical_stack)?;
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO projects (title, slug, github_url, technical_stack) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&project.title)
    .bind(&project.slug)
    .bind(&project.github_url)
    .bind(stack)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get_project(pool: &Pool, id: i64) -> Result<Option<Project>> {
    let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(project_from_row).transpose()
}

/// Projects whose `github_url` contains `fragment`, compared case-insensitively.
///
/// This is a literal substring test, not a URL comparison: `alice/app` also
/// matches `https://github.com/alice/app-extra`.
#[instrument(skip_all)]
pub async fn find_projects_by_url_fragment(pool: &Pool, fragment: &str) -> Result<Vec<Project>> {
    if fragment.is_empty() {
        return Ok(Vec::new());
    }
    // instr() instead of LIKE so `_` and `%` in names are not wildcards.
    let rows = sqlx::query(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE instr(lower(github_url), lower(?)) > 0 ORDER BY id"
    ))
    .bind(fragment)
    .fetch_all(pool)
    .await?;
    rows.iter().map(project_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_project_stats(pool: &Pool, project_id: i64, stats: &ProjectStats) -> Result<()> {
    let seed_stack = match &stats.seed_language {
        Some(lang) => Some(encode_json(&vec![lang.clone()])?),
        None => None,
    };
    sqlx::query(
        "UPDATE projects SET stars_count = ?, forks_count = ?, last_github_sync = ?, \
         technical_stack = CASE WHEN ? IS NOT NULL AND technical_stack IN ('', '[]') THEN ? ELSE technical_stack END \
         WHERE id = ?",
    )
    .bind(stats.stars_count)
    .bind(stats.forks_count)
    .bind(stats.synced_at)
    .bind(seed_stack.as_deref())
    .bind(seed_stack.as_deref())
    .bind(project_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all, fields(source = %source))]
pub async fn start_run(pool: &Pool, source: SyncSource) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sync_runs (source, status, started_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(source.as_str())
    .bind(RunStatus::InProgress.as_str())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Mark an in-progress run successful. Terminal rows are never rewritten.
#[instrument(skip_all, fields(run_id))]
pub async fn finish_run(
    pool: &Pool,
    run_id: i64,
    created: i64,
    updated: i64,
    skipped: i64,
) -> Result<()> {
    let res = sqlx::query(
        "UPDATE sync_runs SET status = ?, items_created = ?, items_updated = ?, items_skipped = ?, \
         finished_at = ? WHERE id = ? AND status = ?",
    )
    .bind(RunStatus::Success.as_str())
    .bind(created)
    .bind(updated)
    .bind(skipped)
    .bind(Utc::now())
    .bind(run_id)
    .bind(RunStatus::InProgress.as_str())
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(SyncError::RunAlreadyFinished(run_id));
    }
    Ok(())
}

/// Mark an in-progress run failed, storing `error_text` verbatim.
#[instrument(skip_all, fields(run_id))]
pub async fn fail_run(pool: &Pool, run_id: i64, error_text: &str) -> Result<()> {
    let res = sqlx::query(
        "UPDATE sync_runs SET status = ?, error_message = ?, finished_at = ? WHERE id = ? AND status = ?",
    )
    .bind(RunStatus::Failed.as_str())
    .bind(error_text)
    .bind(Utc::now())
    .bind(run_id)
    .bind(RunStatus::InProgress.as_str())
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(SyncError::RunAlreadyFinished(run_id));
    }
    Ok(())
}

pub async fn get_run(pool: &Pool, run_id: i64) -> Result<Option<SyncRun>> {
    let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = ?"))
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(run_from_row).transpose()
}

/// Most recent runs first, optionally restricted to one source.
pub async fn list_runs(pool: &Pool, source: Option<SyncSource>, limit: i64) -> Result<Vec<SyncRun>> {
    let source = source.map(|s| s.as_str());
    let rows = sqlx::query(&format!(
        "SELECT {RUN_COLUMNS} FROM sync_runs WHERE (? IS NULL OR source = ?) ORDER BY id DESC LIMIT ?"
    ))
    .bind(source)
    .bind(source)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(run_from_row).collect()
}

/// Take the per-source lease unless another holder has an unexpired one.
#[instrument(skip_all, fields(source = %source, holder))]
pub async fn acquire_lease(
    pool: &Pool,
    source: SyncSource,
    holder: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool> {
    let acquired_at = now.timestamp();
    let expires_at = (now + ttl).timestamp();
    let res = sqlx::query(
        "INSERT INTO sync_leases (source, holder, acquired_at, expires_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(source) DO UPDATE SET holder = excluded.holder, \
         acquired_at = excluded.acquired_at, expires_at = excluded.expires_at \
         WHERE sync_leases.expires_at <= excluded.acquired_at",
    )
    .bind(source.as_str())
    .bind(holder)
    .bind(acquired_at)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all, fields(source = %source, holder))]
pub async fn release_lease(pool: &Pool, source: SyncSource, holder: &str) -> Result<()> {
    sqlx::query("DELETE FROM sync_leases WHERE source = ? AND holder = ?")
        .bind(source.as_str())
        .bind(holder)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn cache_put(pool: &Pool, key: &str, value: &str, ttl: Duration) -> Result<()> {
    sqlx::query(
        "INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
    )
    .bind(key)
    .bind(value)
    .bind((Utc::now() + ttl).timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Cached value for `key`; expired entries read as misses.
pub async fn cache_get(pool: &Pool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>(
        "SELECT value FROM cache_entries WHERE key = ? AND expires_at > ?",
    )
    .bind(key)
    .bind(Utc::now().timestamp())
    .fetch_optional(pool)
    .await?;
    Ok(value)
}

#[instrument(skip_all, fields(key))]
pub async fn cache_invalidate(pool: &Pool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM cache_entries WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn project(slug: &str, url: &str) -> NewProject {
        NewProject {
            title: slug.to_string(),
            slug: slug.to_string(),
            github_url: url.to_string(),
            technical_stack: Vec::new(),
        }
    }

    #[test]
    fn unencodable_json_column_is_database_error() {
        let bad: std::collections::BTreeMap<(i64, i64), i64> = [((1, 2), 3)].into_iter().collect();
        assert!(matches!(encode_json(&bad), Err(SyncError::Database(_))));
        assert_eq!(encode_json(&vec!["Rust".to_string()]).unwrap(), r#"["Rust"]"#);
    }

    #[test]
    fn prepare_sqlite_url_passes_memory_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn prepare_sqlite_url_keeps_query() {
        let td = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/nested/sync.db?mode=rwc", td.path().display());
        let out = prepare_sqlite_url(&url);
        assert!(out.starts_with("sqlite://"));
        assert!(out.ends_with("/nested/sync.db?mode=rwc"));
        assert!(td.path().join("nested").exists());
    }

    #[tokio::test]
    async fn run_log_reaches_terminal_state_once() {
        let pool = setup_pool().await;
        let run_id = start_run(&pool, SyncSource::GitHub).await.unwrap();
        let run = get_run(&pool, run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        assert!(run.finished_at.is_none());

        finish_run(&pool, run_id, 2, 1, 0).await.unwrap();
        let run = get_run(&pool, run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!((run.items_created, run.items_updated), (2, 1));
        assert!(run.finished_at.is_some());

        let err = fail_run(&pool, run_id, "late failure").await.unwrap_err();
        assert!(matches!(err, SyncError::RunAlreadyFinished(id) if id == run_id));
        let err = finish_run(&pool, run_id, 0, 0, 0).await.unwrap_err();
        assert!(matches!(err, SyncError::RunAlreadyFinished(_)));

        let run = get_run(&pool, run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.error_message, "");
    }

    #[tokio::test]
    async fn list_runs_filters_by_source() {
        let pool = setup_pool().await;
        let a = start_run(&pool, SyncSource::GitHub).await.unwrap();
        let b = start_run(&pool, SyncSource::DevTo).await.unwrap();
        fail_run(&pool, b, "boom").await.unwrap();

        let all = list_runs(&pool, None, 10).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b, a]);

        let devto = list_runs(&pool, Some(SyncSource::DevTo), 10).await.unwrap();
        assert_eq!(devto.len(), 1);
        assert_eq!(devto[0].status, RunStatus::Failed);
        assert_eq!(devto[0].error_message, "boom");
    }

    #[tokio::test]
    async fn lease_excludes_second_holder_until_expiry() {
        let pool = setup_pool().await;
        let now = Utc::now();
        let ttl = Duration::seconds(60);

        assert!(acquire_lease(&pool, SyncSource::GitHub, "a", now, ttl).await.unwrap());
        assert!(!acquire_lease(&pool, SyncSource::GitHub, "b", now, ttl).await.unwrap());
        // Other sources are independent.
        assert!(acquire_lease(&pool, SyncSource::Medium, "b", now, ttl).await.unwrap());

        // Expired lease can be taken over.
        let later = now + Duration::seconds(61);
        assert!(acquire_lease(&pool, SyncSource::GitHub, "b", later, ttl).await.unwrap());

        // Releasing with a stale holder id is a no-op.
        release_lease(&pool, SyncSource::GitHub, "a").await.unwrap();
        assert!(!acquire_lease(&pool, SyncSource::GitHub, "c", later, ttl).await.unwrap());

        release_lease(&pool, SyncSource::GitHub, "b").await.unwrap();
        assert!(acquire_lease(&pool, SyncSource::GitHub, "c", later, ttl).await.unwrap());
    }

    #[tokio::test]
    async fn cache_put_get_invalidate() {
        let pool = setup_pool().await;
        cache_put(&pool, "latest_blog_posts", "[1,2]", Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(
            cache_get(&pool, "latest_blog_posts").await.unwrap().as_deref(),
            Some("[1,2]")
        );
        cache_invalidate(&pool, "latest_blog_posts").await.unwrap();
        assert!(cache_get(&pool, "latest_blog_posts").await.unwrap().is_none());

        cache_put(&pool, "stale", "x", Duration::seconds(-5)).await.unwrap();
        assert!(cache_get(&pool, "stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn url_fragment_match_is_case_insensitive_substring() {
        let pool = setup_pool().await;
        let app = insert_project(&pool, &project("app", "https://github.com/Alice/App"))
            .await
            .unwrap();
        let extra = insert_project(&pool, &project("extra", "https://github.com/alice/app-extra"))
            .await
            .unwrap();
        insert_project(&pool, &project("other", "https://github.com/bob/app"))
            .await
            .unwrap();
        insert_project(&pool, &project("none", "")).await.unwrap();

        let found = find_projects_by_url_fragment(&pool, "alice/app").await.unwrap();
        let ids: Vec<i64> = found.iter().map(|p| p.id).collect();
        // The loose match also picks up `app-extra`.
        assert_eq!(ids, vec![app, extra]);

        assert!(find_projects_by_url_fragment(&pool, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn project_stack_is_only_seeded_when_empty() {
        let pool = setup_pool().await;
        let empty = insert_project(&pool, &project("empty", "https://github.com/a/x"))
            .await
            .unwrap();
        let mut with_stack = project("stacked", "https://github.com/a/y");
        with_stack.technical_stack = vec!["Go".into(), "React".into()];
        let stacked = insert_project(&pool, &with_stack).await.unwrap();

        let stats = ProjectStats {
            stars_count: 7,
            forks_count: 2,
            synced_at: Utc::now(),
            seed_language: Some("Rust".into()),
        };
        update_project_stats(&pool, empty, &stats).await.unwrap();
        update_project_stats(&pool, stacked, &stats).await.unwrap();

        let empty = get_project(&pool, empty).await.unwrap().unwrap();
        assert_eq!(empty.technical_stack, vec!["Rust".to_string()]);
        assert_eq!(empty.stars_count, 7);
        assert!(empty.last_github_sync.is_some());

        let stacked = get_project(&pool, stacked).await.unwrap().unwrap();
        assert_eq!(stacked.technical_stack, vec!["Go".to_string(), "React".to_string()]);
        assert_eq!(stacked.forks_count, 2);
    }
}
