use chrono::{DateTime, Utc};

use super::models::{truncate_with_ellipsis, NewArticle, RawEntry, SourceDescriptor};

/// Title used when an entry carries none
pub const UNTITLED: &str = "Untitled";

/// Maximum description length in bytes
pub const DESCRIPTION_MAX_LEN: usize = 300;

/// Why an entry was filtered out before persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeSkip {
    /// No resolvable origin URL
    MissingLink,
}

impl std::fmt::Display for NormalizeSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeSkip::MissingLink => f.write_str("entry has no link"),
        }
    }
}

/// Map a raw entry to a canonical article.
///
/// Missing optional fields degrade to empty strings; a missing or unparseable
/// publication time falls back to `ingested_at`. Only a missing link rejects the
/// entry.
pub fn normalize(
    raw: RawEntry,
    source: &SourceDescriptor,
    ingested_at: DateTime<Utc>,
) -> Result<NewArticle, NormalizeSkip> {
    let link = raw
        .link
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or(NormalizeSkip::MissingLink)?;

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let description = raw
        .summary
        .as_deref()
        .map(excerpt)
        .unwrap_or_default();

    let content = raw.content.unwrap_or_default();

    let pub_date = raw.published.or(raw.updated).unwrap_or(ingested_at);

    let image_url = raw
        .image_url
        .or_else(|| extract_first_image_url(&content))
        .or_else(|| raw.summary.as_deref().and_then(extract_first_image_url))
        .unwrap_or_default();

    Ok(NewArticle {
        title,
        link,
        description,
        content,
        pub_date,
        author: raw.author.unwrap_or_default(),
        source: source.name.clone(),
        image_url,
    })
}

/// Reduce a (possibly HTML) teaser to a single-line plain text excerpt
fn excerpt(summary: &str) -> String {
    let text = html_to_text(summary);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_with_ellipsis(&collapsed, DESCRIPTION_MAX_LEN)
}

/// Convert HTML content to plain text
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 10_000).unwrap_or_else(|_| html.to_string())
}

/// Simple pattern matching for extracting the first image URL from HTML
fn extract_first_image_url(html: &str) -> Option<String> {
    let html_lower = html.to_ascii_lowercase();

    let img_start = html_lower.find("<img")?;
    let remaining = &html[img_start..];

    let src_start = remaining.to_ascii_lowercase().find("src=")?;
    let src_remaining = &remaining[src_start + 4..];

    // Handle both src="url" and src='url'
    let quote_char = src_remaining.chars().next()?;
    if quote_char != '"' && quote_char != '\'' {
        return None;
    }

    let url_end = src_remaining[1..].find(quote_char)?;
    let url = &src_remaining[1..1 + url_end];

    // Filter out tracking pixels
    if url.is_empty() || url.contains("1x1") || url.contains("pixel") || url.contains("tracking") {
        return None;
    }

    Some(url.to_string())
}
