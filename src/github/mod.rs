use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::sync::Deadline;

pub mod model;

pub const GITHUB_API_BASE: &str = "https://api.github.com/";
pub const PER_PAGE: u32 = 100;

/// One raw item of a source listing, consumed immediately by the mapper.
pub type ExternalRecord = Value;

/// Calls the GitHub sync needs. Implemented by [`GitHubClient`] and by test fakes.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// One page (1-based) of the user's repositories. An empty page ends the listing.
    async fn list_repos_page(&self, username: &str, page: u32) -> Result<Vec<ExternalRecord>>;

    /// Language → byte count breakdown from a repository's `languages_url`.
    async fn languages(&self, languages_url: &str) -> Result<BTreeMap<String, i64>>;
}

/// Parse an API base so relative endpoints extend its path. A base without a
/// trailing slash gets one, otherwise `join` would replace its last segment.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| SyncError::Config(format!("invalid base URL {raw:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(SyncError::Config(format!("invalid base URL {raw:?}: not a hierarchical URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.header("Authorization", format!("token {token}")),
            None => builder,
        }
    }

    pub fn build_list_request(&self, username: &str, page: u32) -> Result<reqwest::Request> {
        let mut endpoint = self
            .base_url
            .join(&format!("users/{username}/repos"))
            .map_err(|e| SyncError::Config(format!("invalid GitHub API base: {e}")))?;
        endpoint
            .query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string())
            .append_pair("sort", "updated")
            .append_pair("page", &page.to_string());
        Ok(self.authorized(self.http.get(endpoint)).build()?)
    }

    pub fn build_languages_request(&self, languages_url: &str) -> Result<reqwest::Request> {
        let url = Url::parse(languages_url)
            .map_err(|e| SyncError::Transport(format!("invalid languages_url {languages_url:?}: {e}")))?;
        Ok(self.authorized(self.http.get(url)).build()?)
    }

    async fn execute_json(&self, request: reqwest::Request) -> Result<Value> {
        debug!(url = %request.url(), "sending github request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "GitHub rate limit or permission error");
            return Err(SyncError::Transport(format!("github refused request {status}: {body}")));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::Transport(format!("github error {status}: {body}")));
        }
        let body = res.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| SyncError::Transport(format!("invalid GitHub response JSON: {e}")))
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn list_repos_page(&self, username: &str, page: u32) -> Result<Vec<ExternalRecord>> {
        let request = self.build_list_request(username, page)?;
        match self.execute_json(request).await? {
            Value::Array(items) => Ok(items),
            other => Err(SyncError::Transport(format!(
                "expected a JSON array of repositories, got {}",
                json_kind(&other)
            ))),
        }
    }

    async fn languages(&self, languages_url: &str) -> Result<BTreeMap<String, i64>> {
        let request = self.build_languages_request(languages_url)?;
        let body = self.execute_json(request).await?;
        serde_json::from_value(body)
            .map_err(|e| SyncError::Transport(format!("invalid languages response: {e}")))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Lazily page through a user's repositories. The next page is requested only
/// once the previous one is drained; an empty page ends the stream and the
/// first failure is yielded as the stream's last item.
pub fn repo_records<'a>(
    api: &'a dyn GitHubApi,
    username: &'a str,
    deadline: Deadline,
) -> impl Stream<Item = Result<ExternalRecord>> + 'a {
    stream::try_unfold(Some(1u32), move |page| next_page(api, username, page, deadline))
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<ExternalRecord, SyncError>)))
        .try_flatten()
}

async fn next_page(
    api: &dyn GitHubApi,
    username: &str,
    page: Option<u32>,
    deadline: Deadline,
) -> Result<Option<(Vec<ExternalRecord>, Option<u32>)>> {
    let Some(page) = page else {
        return Ok(None);
    };
    deadline.check(&format!("fetching page {page}"))?;
    let records = api.list_repos_page(username, page).await?;
    debug!(page, count = records.len(), "fetched repository page");
    if records.is_empty() {
        return Ok(None);
    }
    Ok(Some((records, Some(page + 1))))
}
