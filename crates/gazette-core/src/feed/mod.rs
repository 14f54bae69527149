mod client;
mod models;
mod normalizer;
mod opml;
mod parser;

pub use client::{FeedClient, FetchCause, FetchError, HttpFeedClient};
pub use models::{Article, FeedFormat, NewArticle, RawEntry, SourceDescriptor};
pub use normalizer::{normalize, NormalizeSkip, DESCRIPTION_MAX_LEN, UNTITLED};
pub use opml::{parse_opml, parse_opml_file};
pub use parser::{parse_feed, ParsedFeed};
