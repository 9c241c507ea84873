//! Pure translation from raw external records to local field sets.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

use crate::blog::model::{DevToArticle, FeedEntry};
use crate::db::model::{BlogPostFields, RepoFields};
use crate::error::{Result, SyncError};
use crate::github::model::RepoRecord;
use crate::model::SyncSource;

/// Storage limit of `blog_posts.slug`.
pub const SLUG_MAX_LEN: usize = 350;
pub const WORDS_PER_MINUTE: usize = 200;
pub const EXCERPT_MAX_CHARS: usize = 300;

static NON_SLUG_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid slug regex"));
static SLUG_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\s]+").expect("valid separator regex"));
static HTML_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Lowercase, ASCII-only, hyphen-separated slug. Accents are folded away by
/// compatibility decomposition; characters with no ASCII form are dropped.
pub fn slugify(value: &str) -> String {
    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let cleaned = NON_SLUG_CHARS.replace_all(&lowered, "");
    let joined = SLUG_SEPARATORS.replace_all(cleaned.trim(), "-");
    joined.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Cut `slug` to at most `max_len` characters without leaving a trailing separator.
pub fn truncate_slug(slug: &str, max_len: usize) -> String {
    let cut: String = slug.chars().take(max_len).collect();
    cut.trim_end_matches(|c| c == '-' || c == '_').to_string()
}

/// Slug for a post title, falling back to one derived from the external id
/// when the title has no sluggable characters.
pub fn post_slug(title: &str, external_id: &str) -> String {
    let slug = truncate_slug(&slugify(title), SLUG_MAX_LEN);
    if !slug.is_empty() {
        return slug;
    }
    let fallback = truncate_slug(&slugify(&format!("post-{external_id}")), SLUG_MAX_LEN);
    if fallback.is_empty() {
        "post".to_string()
    } else {
        fallback
    }
}

/// Parse the sources' ISO-8601 timestamps (`2024-01-02T03:04:05Z`).
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Mapping(format!("{field}: invalid timestamp {value:?}: {e}")))
}

/// RSS `pubDate` (RFC 2822); RFC 3339 is accepted too for Atom-flavoured feeds.
pub fn parse_feed_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Mapping(format!("pubDate: invalid date {value:?}: {e}")))
}

pub fn strip_html(value: &str) -> String {
    HTML_TAGS.replace_all(value, " ").into_owned()
}

/// Approximate reading time: words / 200, rounded down. Zero is a valid result.
pub fn estimate_read_time(content: &str) -> i64 {
    let words = strip_html(content).split_whitespace().count();
    (words / WORDS_PER_MINUTE) as i64
}

fn decode_record<T: DeserializeOwned>(kind: &str, raw: &Value) -> Result<T> {
    T::deserialize(raw).map_err(|e| {
        let id = raw
            .get("full_name")
            .or_else(|| raw.get("id"))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<unknown>".into());
        SyncError::Mapping(format!("{kind} {id}: {e}"))
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn parse_repo_record(raw: &Value) -> Result<RepoRecord> {
    decode_record("repository", raw)
}

pub fn map_repo(record: &RepoRecord, languages: BTreeMap<String, i64>) -> Result<RepoFields> {
    let updated_at_github = parse_timestamp("updated_at", &record.updated_at)?;
    let pushed_at_github = match non_blank(record.pushed_at.as_deref()) {
        Some(pushed) => parse_timestamp("pushed_at", pushed)?,
        None => updated_at_github,
    };
    Ok(RepoFields {
        name: record.name.clone(),
        full_name: record.full_name.clone(),
        description: record.description.clone().unwrap_or_default(),
        html_url: record.html_url.clone(),
        clone_url: record.clone_url.clone(),
        homepage: record.homepage.clone().unwrap_or_default(),
        stars_count: record.stargazers_count,
        forks_count: record.forks_count,
        watchers_count: record.watchers_count,
        open_issues_count: record.open_issues_count,
        primary_language: record.language.clone().unwrap_or_default(),
        languages,
        created_at_github: parse_timestamp("created_at", &record.created_at)?,
        updated_at_github,
        pushed_at_github,
    })
}

pub fn map_devto_article(raw: &Value, username: &str) -> Result<BlogPostFields> {
    let article: DevToArticle = decode_record("article", raw)?;
    let external_id = article.id.to_string();
    let title = article.title.trim().to_string();
    if title.is_empty() {
        return Err(SyncError::Mapping(format!("article {external_id}: empty title")));
    }
    let author_name = article
        .user
        .as_ref()
        .and_then(|u| non_blank(u.name.as_deref()).or(non_blank(u.username.as_deref())))
        .unwrap_or(username)
        .to_string();
    let read_time_minutes = article.reading_time_minutes.unwrap_or_else(|| {
        estimate_read_time(article.body_markdown.as_deref().unwrap_or_default())
    });

    Ok(BlogPostFields {
        source: SyncSource::DevTo,
        slug: post_slug(&title, &external_id),
        external_id,
        title,
        external_url: article.url,
        excerpt: article.description.unwrap_or_default(),
        cover_image: article.cover_image.unwrap_or_default(),
        author_name,
        published_at: parse_timestamp("published_at", &article.published_at)?,
        read_time_minutes,
        reactions_count: article.positive_reactions_count,
        comments_count: article.comments_count,
    })
}

pub fn map_feed_entry(entry: &FeedEntry, username: &str) -> Result<BlogPostFields> {
    let link = non_blank(entry.link.as_deref())
        .ok_or_else(|| SyncError::Mapping("feed entry without link".into()))?;
    let external_id = non_blank(entry.guid.as_deref()).unwrap_or(link).to_string();
    let title = non_blank(entry.title.as_deref())
        .ok_or_else(|| SyncError::Mapping(format!("feed entry {external_id}: missing title")))?
        .to_string();
    let pub_date = non_blank(entry.pub_date.as_deref()).ok_or_else(|| {
        SyncError::Mapping(format!("feed entry {external_id}: missing pubDate"))
    })?;

    let excerpt: String = entry
        .summary
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(EXCERPT_MAX_CHARS)
        .collect();

    Ok(BlogPostFields {
        source: SyncSource::Medium,
        slug: post_slug(&title, &external_id),
        published_at: parse_feed_date(pub_date)?,
        external_url: link.to_string(),
        external_id,
        title,
        excerpt,
        cover_image: entry.media_url.clone().unwrap_or_default(),
        author_name: non_blank(entry.creator.as_deref()).unwrap_or(username).to_string(),
        read_time_minutes: estimate_read_time(entry.content.as_deref().unwrap_or_default()),
        reactions_count: 0,
        comments_count: 0,
    })
}
