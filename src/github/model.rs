use serde::Deserialize;

/// The subset of a `GET /users/{username}/repos` item the sync reads.
#[derive(Deserialize, Debug, Clone)]
pub struct RepoRecord {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub clone_url: String,
    pub homepage: Option<String>,
    pub stargazers_count: i64,
    pub forks_count: i64,
    pub watchers_count: i64,
    pub open_issues_count: i64,
    pub language: Option<String>,
    #[serde(default)]
    pub fork: bool,
    pub languages_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Null for repositories that never received a push.
    pub pushed_at: Option<String>,
}
