use serde::Deserialize;

/// The subset of a Dev.to `GET /api/articles` item the sync reads.
#[derive(Deserialize, Debug, Clone)]
pub struct DevToArticle {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub published_at: String,
    pub user: Option<DevToUser>,
    pub reading_time_minutes: Option<i64>,
    #[serde(default)]
    pub positive_reactions_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    pub body_markdown: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DevToUser {
    pub name: Option<String>,
    pub username: Option<String>,
}

/// One `<item>` of an RSS feed. Every field is optional at parse time; the
/// mapper decides which ones a post cannot do without.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub pub_date: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub creator: Option<String>,
    pub media_url: Option<String>,
}
