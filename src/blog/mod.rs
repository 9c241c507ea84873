use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::github::{parse_base_url, ExternalRecord};

pub mod model;
pub mod rss;

pub const DEVTO_API_BASE: &str = "https://dev.to/";
pub const MEDIUM_FEED_BASE: &str = "https://medium.com/feed/";

/// Calls the blog sync needs. Implemented by [`BlogClient`] and by test fakes.
#[async_trait]
pub trait BlogApi: Send + Sync {
    /// Latest published Dev.to articles of `username`, at most `limit`.
    async fn devto_articles(&self, username: &str, limit: u32) -> Result<Vec<ExternalRecord>>;

    /// Raw RSS document of the user's Medium feed.
    async fn medium_feed(&self, username: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct BlogClient {
    http: Client,
    devto_base: Url,
    medium_base: Url,
}

impl BlogClient {
    pub fn new(
        devto_base: &str,
        medium_base: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            devto_base: parse_base_url(devto_base)?,
            medium_base: parse_base_url(medium_base)?,
        })
    }

    pub fn build_devto_request(&self, username: &str, limit: u32) -> Result<reqwest::Request> {
        let mut endpoint = self
            .devto_base
            .join("api/articles")
            .map_err(|e| SyncError::Config(format!("invalid Dev.to base: {e}")))?;
        endpoint
            .query_pairs_mut()
            .append_pair("username", username)
            .append_pair("per_page", &limit.to_string());
        Ok(self
            .http
            .get(endpoint)
            .header("Accept", "application/json")
            .build()?)
    }

    pub fn build_medium_request(&self, username: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .medium_base
            .join(&format!("@{username}"))
            .map_err(|e| SyncError::Config(format!("invalid Medium feed base: {e}")))?;
        Ok(self
            .http
            .get(endpoint)
            .header("Accept", "application/rss+xml, application/xml")
            .build()?)
    }

    async fn execute_text(&self, request: reqwest::Request) -> Result<String> {
        debug!(url = %request.url(), "sending blog request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::Transport(format!("blog source error {status}: {body}")));
        }
        Ok(res.text().await?)
    }
}

#[async_trait]
impl BlogApi for BlogClient {
    async fn devto_articles(&self, username: &str, limit: u32) -> Result<Vec<ExternalRecord>> {
        let request = self.build_devto_request(username, limit)?;
        let body = self.execute_text(request).await?;
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(_) => Err(SyncError::Transport(
                "expected a JSON array of articles".into(),
            )),
            Err(e) => Err(SyncError::Transport(format!("invalid Dev.to response JSON: {e}"))),
        }
    }

    async fn medium_feed(&self, username: &str) -> Result<String> {
        let request = self.build_medium_request(username)?;
        self.execute_text(request).await
    }
}
