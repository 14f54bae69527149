use feed_rs::model::{Entry, FeedType};
use feed_rs::parser;

use super::models::{FeedFormat, RawEntry};
use crate::{Error, Result};

/// Parsed feed data from RSS/Atom/JSON Feed content
#[derive(Debug)]
pub struct ParsedFeed {
    pub format: FeedFormat,
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

/// Parse a feed payload into raw entries.
///
/// The payload's syntax is detected from its content; every supported format is
/// reduced to the same `RawEntry` shape. A payload that is a valid feed with no
/// items yields an empty entry list.
pub fn parse_feed(content: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(content).map_err(|e| Error::FeedParse(e.to_string()))?;

    let format = match feed.feed_type {
        FeedType::Atom => FeedFormat::Atom,
        FeedType::JSON => FeedFormat::JsonFeed,
        FeedType::RSS0 => FeedFormat::Rss0,
        FeedType::RSS1 => FeedFormat::Rss1,
        FeedType::RSS2 => FeedFormat::Rss2,
    };

    let title = feed.title.map(|t| t.content);
    let entries = feed.entries.into_iter().map(raw_entry).collect();

    Ok(ParsedFeed {
        format,
        title,
        entries,
    })
}

fn raw_entry(entry: Entry) -> RawEntry {
    // Prefer the alternate (human-facing) link; Atom feeds may also list self/enclosure links
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty());

    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty());

    let summary = entry.summary.map(|s| s.content);
    let content = entry.content.and_then(|c| c.body);
    let author = entry
        .authors
        .first()
        .map(|a| a.name.trim().to_string())
        .filter(|name| !name.is_empty());

    // Thumbnails first, then image enclosures / media content
    let image_url = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next()
        .or_else(|| {
            entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .filter(|c| {
                    c.content_type
                        .as_ref()
                        .map_or(true, |ct| ct.to_string().starts_with("image/"))
                })
                .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
        });

    RawEntry {
        title,
        link,
        summary,
        content,
        published: entry.published,
        updated: entry.updated,
        author,
        image_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://example.com</link>
    <description>Example</description>
    <item>
      <title>First story</title>
      <link>https://example.com/first</link>
      <description>&lt;p&gt;Teaser text&lt;/p&gt;</description>
      <author>jane@example.com (Jane)</author>
      <pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate>
      <enclosure url="https://example.com/first.jpg" type="image/jpeg" length="1024"/>
    </item>
    <item>
      <title>No link here</title>
      <description>Orphan</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2025-06-10T18:30:02Z</updated>
  <entry>
    <title>Atom entry</title>
    <link rel="self" href="https://example.org/api/1"/>
    <link rel="alternate" href="https://example.org/2025/atom-entry"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2025-06-10T18:30:02Z</updated>
    <summary>Some text.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_entries() {
        let parsed = parse_feed(RSS_SAMPLE.as_bytes()).unwrap();
        assert_eq!(parsed.format, FeedFormat::Rss2);
        assert_eq!(parsed.title.as_deref(), Some("Example News"));
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.title.as_deref(), Some("First story"));
        assert_eq!(first.link.as_deref(), Some("https://example.com/first"));
        assert!(first.published.is_some());
        assert_eq!(first.image_url.as_deref(), Some("https://example.com/first.jpg"));
        assert!(first.summary.as_deref().unwrap().contains("Teaser text"));

        assert_eq!(parsed.entries[1].link, None);
    }

    #[test]
    fn test_parse_atom_prefers_alternate_link() {
        let parsed = parse_feed(ATOM_SAMPLE.as_bytes()).unwrap();
        assert_eq!(parsed.format, FeedFormat::Atom);
        assert_eq!(
            parsed.entries[0].link.as_deref(),
            Some("https://example.org/2025/atom-entry")
        );
        assert!(parsed.entries[0].updated.is_some());
    }

    #[test]
    fn test_audio_enclosure_is_not_an_image() {
        let payload = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Pod</title><link>https://p.example</link><description>-</description>
<item><title>Episode</title><link>https://p.example/1</link>
<enclosure url="https://p.example/1.mp3" type="audio/mpeg" length="2048"/></item>
</channel></rss>"#;
        let parsed = parse_feed(payload.as_bytes()).unwrap();
        assert_eq!(parsed.entries[0].image_url, None);
    }

    #[test]
    fn test_empty_channel_is_not_an_error() {
        let payload = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Quiet</title><link>https://q.example</link><description>-</description></channel></rss>"#;
        let parsed = parse_feed(payload.as_bytes()).unwrap();
        assert!(parsed.entries.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let result = parse_feed(b"this is definitely not a feed");
        assert!(matches!(result, Err(Error::FeedParse(_))));
    }
}
