use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, USER_AGENT};
use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use url::Url;

use super::models::{RawEntry, SourceDescriptor};
use super::parser::parse_feed;
use crate::config::AppConfig;
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
const CLIENT_USER_AGENT: &str = concat!("gazette/", env!("CARGO_PKG_VERSION"));

/// Why fetching one source failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchCause {
    InvalidUrl(String),
    Timeout,
    Transport(String),
    Status(u16),
    TooLarge(usize),
    Parse(String),
    /// The source's ingestion task died before reporting
    TaskFailed(String),
}

impl std::fmt::Display for FetchCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchCause::InvalidUrl(e) => write!(f, "invalid feed URL: {}", e),
            FetchCause::Timeout => f.write_str("request timed out"),
            FetchCause::Transport(e) => write!(f, "transport error: {}", e),
            FetchCause::Status(code) => write!(f, "HTTP {}", code),
            FetchCause::TooLarge(size) => write!(f, "feed too large ({} bytes)", size),
            FetchCause::Parse(e) => write!(f, "unparseable feed: {}", e),
            FetchCause::TaskFailed(e) => write!(f, "ingestion task failed: {}", e),
        }
    }
}

/// A failed fetch, attributed to its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchError {
    /// Display name of the failing source
    pub source: String,
    pub cause: FetchCause,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.cause)
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    pub fn new(source: &SourceDescriptor, cause: FetchCause) -> Self {
        Self {
            source: source.name.clone(),
            cause,
        }
    }
}

/// Retrieves one source's payload and parses it into raw entries.
///
/// Implementations must bound each call in time and must not retry internally.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, source: &SourceDescriptor) -> std::result::Result<Vec<RawEntry>, FetchError>;
}

/// Feed client backed by reqwest
pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    /// Create a new feed client with configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_timeout(
            Duration::from_secs(config.sync.request_timeout_secs),
            config.sync.proxy_url.as_deref(),
        )
    }

    /// Build HTTP client with a request timeout and optional proxy
    pub fn with_timeout(timeout: Duration, proxy_url: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(Self::default_headers())
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(proxy) = proxy_url {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Using HTTP proxy for feed fetching");
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml,application/atom+xml,application/feed+json,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers
    }

    /// Download the raw payload for a source
    async fn download(&self, source: &SourceDescriptor) -> std::result::Result<Bytes, FetchCause> {
        let url = Url::parse(&source.feed_url).map_err(|e| FetchCause::InvalidUrl(e.to_string()))?;

        let response = self.client.get(url).send().await.map_err(transport_cause)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchCause::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            ensure_content_size(length as usize)?;
        }

        let body = response.bytes().await.map_err(transport_cause)?;
        ensure_content_size(body.len())?;

        Ok(body)
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, source: &SourceDescriptor) -> std::result::Result<Vec<RawEntry>, FetchError> {
        tracing::info!("Fetching feed '{}' from: {}", source.name, source.feed_url);

        let body = self
            .download(source)
            .await
            .map_err(|cause| FetchError::new(source, cause))?;

        let parsed = parse_feed(&body).map_err(|e| {
            let detail = match e {
                Error::FeedParse(msg) => msg,
                other => other.to_string(),
            };
            FetchError::new(source, FetchCause::Parse(detail))
        })?;

        tracing::debug!(
            "Feed '{}' parsed as {:?} with {} entries",
            source.name,
            parsed.format,
            parsed.entries.len()
        );

        Ok(parsed.entries)
    }
}

fn transport_cause(err: reqwest::Error) -> FetchCause {
    if err.is_timeout() {
        FetchCause::Timeout
    } else {
        FetchCause::Transport(err.to_string())
    }
}

fn ensure_content_size(size: usize) -> std::result::Result<(), FetchCause> {
    if size > MAX_FEED_BYTES {
        return Err(FetchCause::TooLarge(size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const RSS_TWO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><link>https://t.example</link><description>-</description>
<item><title>One</title><link>https://t.example/1</link></item>
<item><title>Two</title><link>https://t.example/2</link></item>
</channel></rss>"#;

    fn client(timeout: Duration) -> HttpFeedClient {
        HttpFeedClient::with_timeout(timeout, None).unwrap()
    }

    fn source_for(server: &MockServer, route: &str) -> SourceDescriptor {
        SourceDescriptor::new("Mock", format!("{}{}", server.uri(), route))
    }

    #[tokio::test]
    async fn test_fetch_parses_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS_TWO_ITEMS))
            .mount(&server)
            .await;

        let entries = client(Duration::from_secs(5))
            .fetch(&source_for(&server, "/feed.xml"))
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].link.as_deref(), Some("https://t.example/2"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(Duration::from_secs(5))
            .fetch(&source_for(&server, "/feed.xml"))
            .await
            .unwrap_err();

        assert_eq!(err.source, "Mock");
        assert_eq!(err.cause, FetchCause::Status(503));
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>oops</body></html>"))
            .mount(&server)
            .await;

        let err = client(Duration::from_secs(5))
            .fetch(&source_for(&server, "/feed.xml"))
            .await
            .unwrap_err();

        assert!(matches!(err.cause, FetchCause::Parse(_)));
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(RSS_TWO_ITEMS)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client(Duration::from_millis(200))
            .fetch(&source_for(&server, "/slow.xml"))
            .await
            .unwrap_err();

        assert_eq!(err.cause, FetchCause::Timeout);
    }

    #[tokio::test]
    async fn test_invalid_url_is_fetch_error() {
        let source = SourceDescriptor::new("Broken", "not a url");
        let err = client(Duration::from_secs(1)).fetch(&source).await.unwrap_err();
        assert!(matches!(err.cause, FetchCause::InvalidUrl(_)));
    }
}
