//! Write models handed to repositories.
//!
//! These carry the mapped field set of one external record. Identity columns
//! (`id`) and bookkeeping timestamps are owned by the repository layer.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::model::SyncSource;

/// Complete field set of a repository as mapped from the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFields {
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
}

/// Complete field set of a blog post as mapped from Dev.to or an RSS entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogPostFields {
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
}

/// Denormalized repository stats copied onto a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStats {
    pub stars_count: i64,
    pub forks_count: i64,
    pub synced_at: DateTime<Utc>,
    /// Only written when the project's stack is currently empty.
    pub seed_language: Option<String>,
}

/// Insert model for projects; used by site tooling and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub title: String,
    pub slug: String,
    pub github_url: String,
    pub technical_stack: Vec<String>,
}
