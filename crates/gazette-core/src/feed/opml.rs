use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

use super::models::SourceDescriptor;
use crate::{Error, Result};

/// Read source descriptors from an OPML subscription list
pub fn parse_opml_file(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let content = std::fs::read_to_string(path)?;
    parse_opml(&content)
}

/// Extract one source descriptor per `outline` element carrying an `xmlUrl`.
///
/// The display name comes from `title`, then `text`, then the feed URL's host.
pub fn parse_opml(content: &str) -> Result<Vec<SourceDescriptor>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut sources = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                let mut xml_url = None;
                let mut title = None;
                let mut text = None;

                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.trim().to_string())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).trim().to_string());
                    if value.is_empty() {
                        continue;
                    }
                    match attr.key.as_ref() {
                        b"xmlUrl" => xml_url = Some(value),
                        b"title" => title = Some(value),
                        b"text" => text = Some(value),
                        _ => {}
                    }
                }

                // Categories have no xmlUrl
                if let Some(feed_url) = xml_url {
                    let name = title
                        .or(text)
                        .or_else(|| host_of(&feed_url))
                        .unwrap_or_else(|| feed_url.clone());
                    sources.push(SourceDescriptor::new(name, feed_url));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::FeedParse(format!("Failed to parse OPML: {}", e)));
            }
            _ => {}
        }
    }

    Ok(sources)
}

fn host_of(feed_url: &str) -> Option<String> {
    Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opml_names() {
        let opml = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Test</title></head>
  <body>
    <outline text="Category">
      <outline text="Feed 1" title="Feed One" xmlUrl="https://example.com/feed1.xml" type="rss"/>
      <outline text="Feed 2" xmlUrl="https://example.com/feed2.xml" type="rss"/>
    </outline>
    <outline xmlUrl="https://news.example.org/rss?a=1&amp;b=2" type="rss"/>
  </body>
</opml>"#;

        let sources = parse_opml(opml).unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].name, "Feed One");
        assert_eq!(sources[0].feed_url, "https://example.com/feed1.xml");
        assert_eq!(sources[1].name, "Feed 2");
        assert_eq!(sources[2].name, "news.example.org");
        assert_eq!(sources[2].feed_url, "https://news.example.org/rss?a=1&b=2");
    }

    #[test]
    fn test_parse_opml_skips_categories() {
        let opml = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <body>
    <outline text="Empty Category"/>
  </body>
</opml>"#;

        assert!(parse_opml(opml).unwrap().is_empty());
    }
}
