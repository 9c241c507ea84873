//! Configuration loader and validator for the sync daemon and one-shot tools.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::BlogSource;
use crate::sync::SyncOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub http: Http,
    pub github: GitHub,
    pub blog: Blog,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// How long a run may hold its per-source lease before others can take over.
    pub lease_seconds: u64,
    /// Per-run deadline, checked before every outbound request. Together with
    /// one request timeout it must fit inside `lease_seconds`.
    pub run_timeout_seconds: u64,
}

/// Outbound HTTP settings shared by every source client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Http {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHub {
    #[serde(default)]
    pub username: String,
    /// Optional; only raises the rate limit.
    #[serde(default)]
    pub token: String,
    pub api_base: String,
    #[serde(default)]
    pub include_forks: bool,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Blog {
    #[serde(default)]
    pub devto_username: String,
    #[serde(default)]
    pub medium_username: String,
    pub limit: u32,
    pub devto_api_base: String,
    pub medium_feed_base: String,
    pub interval_seconds: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// `DATABASE_URL` if set, otherwise a SQLite file inside `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/portfolio.db", self.app.resolved_data_dir()))
    }

    /// Apply `GITHUB_USERNAME`, `GITHUB_TOKEN`, `DEVTO_USERNAME` and
    /// `MEDIUM_USERNAME` over the file values when they are non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets: [(&str, &mut String); 4] = [
            ("GITHUB_USERNAME", &mut self.github.username),
            ("GITHUB_TOKEN", &mut self.github.token),
            ("DEVTO_USERNAME", &mut self.blog.devto_username),
            ("MEDIUM_USERNAME", &mut self.blog.medium_username),
        ];
        for (key, slot) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = value;
            }
        }
    }

    pub fn github_token(&self) -> Option<String> {
        Some(self.github.token.trim().to_string()).filter(|t| !t.is_empty())
    }

    /// Dev.to when its username is set, otherwise Medium, otherwise nothing.
    pub fn blog_target(&self) -> Option<(BlogSource, String)> {
        let devto = self.blog.devto_username.trim();
        if !devto.is_empty() {
            return Some((BlogSource::DevTo, devto.to_string()));
        }
        let medium = self.blog.medium_username.trim();
        if !medium.is_empty() {
            return Some((BlogSource::Medium, medium.to_string()));
        }
        None
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            include_forks: self.github.include_forks,
            deadline: Some(Duration::from_secs(self.app.run_timeout_seconds)),
            lease_ttl: chrono::Duration::seconds(self.app.lease_seconds as i64),
        }
    }
}

impl App {
    /// `data_dir` with a leading `~/` expanded against `HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match (self.data_dir.strip_prefix("~/"), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
            _ => self.data_dir.clone(),
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance. Empty usernames are allowed here; they
/// are reported per run instead.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.lease_seconds == 0 {
        return Err(ConfigError::Invalid("app.lease_seconds must be > 0"));
    }
    if cfg.app.run_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("app.run_timeout_seconds must be > 0"));
    }

    if cfg.http.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("http.timeout_seconds must be > 0"));
    }
    // The last deadline check can still start one request of up to
    // timeout_seconds; the lease has to cover it.
    if cfg.app.run_timeout_seconds.saturating_add(cfg.http.timeout_seconds) >= cfg.app.lease_seconds {
        return Err(ConfigError::Invalid(
            "app.run_timeout_seconds + http.timeout_seconds must be < app.lease_seconds",
        ));
    }
    if cfg.http.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("http.user_agent must be non-empty"));
    }

    if Url::parse(&cfg.github.api_base).is_err() {
        return Err(ConfigError::Invalid("github.api_base must be a valid URL"));
    }
    if cfg.github.interval_seconds == 0 {
        return Err(ConfigError::Invalid("github.interval_seconds must be > 0"));
    }

    if cfg.blog.limit == 0 {
        return Err(ConfigError::Invalid("blog.limit must be > 0"));
    }
    if Url::parse(&cfg.blog.devto_api_base).is_err() {
        return Err(ConfigError::Invalid("blog.devto_api_base must be a valid URL"));
    }
    if Url::parse(&cfg.blog.medium_feed_base).is_err() {
        return Err(ConfigError::Invalid("blog.medium_feed_base must be a valid URL"));
    }
    if cfg.blog.interval_seconds == 0 {
        return Err(ConfigError::Invalid("blog.interval_seconds must be > 0"));
    }

    Ok(())
}

/// Example configuration, also shipped as `config.example.yaml`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  lease_seconds: 900
  run_timeout_seconds: 600

http:
  timeout_seconds: 30
  user_agent: "portfolio-sync/0.1"

github:
  username: "octocat"
  token: ""
  api_base: "https://api.github.com/"
  include_forks: false
  interval_seconds: 86400

blog:
  devto_username: ""
  medium_username: "octocat"
  limit: 10
  devto_api_base: "https://dev.to/"
  medium_feed_base: "https://medium.com/feed/"
  interval_seconds: 21600
"#
}
