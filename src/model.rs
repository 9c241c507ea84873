use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// External system a run pulls from. Also the key of the run lease.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    GitHub,
    DevTo,
    Medium,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::GitHub => "github",
            SyncSource::DevTo => "devto",
            SyncSource::Medium => "medium",
        }
    }

    pub fn parse_source(s: &str) -> Option<Self> {
        match s {
            "github" => Some(SyncSource::GitHub),
            "devto" => Some(SyncSource::DevTo),
            "medium" => Some(SyncSource::Medium),
            _ => None,
        }
    }

    /// Cache entry holding the "latest synced items" listing for this source.
    pub fn cache_key(&self) -> &'static str {
        match self {
            SyncSource::GitHub => LATEST_GITHUB_REPOS,
            SyncSource::DevTo | SyncSource::Medium => LATEST_BLOG_POSTS,
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const LATEST_BLOG_POSTS: &str = "latest_blog_posts";
pub const LATEST_GITHUB_REPOS: &str = "latest_github_repos";

/// Blog platforms. A narrower view of [`SyncSource`] so a blog run can never
/// be pointed at GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BlogSource {
    #[value(name = "devto")]
    DevTo,
    Medium,
}

impl From<BlogSource> for SyncSource {
    fn from(source: BlogSource) -> Self {
        match source {
            BlogSource::DevTo => SyncSource::DevTo,
            BlogSource::Medium => SyncSource::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(RunStatus::InProgress),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub html_url: String,
    pub clone_url: String,
    pub homepage: String,
    pub stars_count: i64,
    pub forks_count: i64,
    pub watchers_count: i64,
    pub open_issues_count: i64,
    pub primary_language: String,
    pub languages: BTreeMap<String, i64>,
    pub created_at_github: DateTime<Utc>,
    pub updated_at_github: DateTime<Utc>,
    pub pushed_at_github: DateTime<Utc>,
    pub last_synced: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlogPost {
    pub id: i64,
    pub source: SyncSource,
    pub external_id: String,
    pub title: String,
    pub slug: String,
    pub external_url: String,
    pub excerpt: String,
    pub cover_image: String,
    pub author_name: String,
    pub published_at: DateTime<Utc>,
    pub read_time_minutes: i64,
    pub reactions_count: i64,
    pub comments_count: i64,
    pub is_published: bool,
    pub last_synced: DateTime<Utc>,
}

/// Portfolio project owned by the site. Sync only writes its GitHub stats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub github_url: String,
    pub technical_stack: Vec<String>,
    pub stars_count: i64,
    pub forks_count: i64,
    pub last_github_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub source: SyncSource,
    pub status: RunStatus,
    pub items_created: i64,
    pub items_updated: i64,
    pub items_skipped: i64,
    pub error_message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
