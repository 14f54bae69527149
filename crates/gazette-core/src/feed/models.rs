use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One configured feed endpoint. Identity is `feed_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Display name shown to readers as the article's provenance
    pub name: String,
    pub feed_url: String,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feed_url: feed_url.into(),
        }
    }

    pub(crate) fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            feed_url: self.feed_url.trim().to_string(),
        }
    }
}

/// Feed syntax a payload was recognised as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFormat {
    Rss0,
    Rss1,
    Rss2,
    Atom,
    JsonFeed,
}

/// An item as parsed from a feed payload, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Summary or teaser, possibly HTML
    pub summary: Option<String>,
    /// Full body, possibly HTML
    pub content: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub author: Option<String>,
    /// Image reference carried by media/enclosure elements
    pub image_url: Option<String>,
}

/// Canonical article ready to be written by the persist gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub pub_date: DateTime<Utc>,
    pub author: String,
    pub source: String,
    pub image_url: String,
}

/// A persisted article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub pub_date: DateTime<Utc>,
    pub author: String,
    pub source: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl Article {
    /// Get a preview of the description (first N bytes, cut on a char boundary)
    pub fn description_preview(&self, max_len: usize) -> String {
        truncate_with_ellipsis(&self.description, max_len)
    }
}

/// Truncate to at most `max_len` bytes on a char boundary, appending "..." when cut
pub(crate) fn truncate_with_ellipsis(text: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }

    if text.len() <= max_len {
        text.to_string()
    } else {
        let mut end = 0;
        for (idx, ch) in text.char_indices() {
            let next = idx + ch.len_utf8();
            if next > max_len {
                break;
            }
            end = next;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_with_ellipsis("héllo wörld", 3), "hé...");
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("anything", 0), "");
    }
}
