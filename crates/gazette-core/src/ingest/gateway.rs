use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::DuplicatePolicy;
use crate::feed::NewArticle;
use crate::storage::{ArticleRepository, Database, UpsertOutcome};
use crate::{Error, Result};

/// A write that failed for one article; its siblings are unaffected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistError {
    pub link: String,
    pub message: String,
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to persist {}: {}", self.link, self.message)
    }
}

impl std::error::Error for PersistError {}

/// Sole writer of articles.
///
/// Deduplication is delegated to the store's uniqueness constraint on `link`;
/// implementations never check for existence before writing.
#[async_trait]
pub trait ArticleGateway: Send + Sync {
    /// Fails with `Error::StoreUnavailable` when the store cannot be reached at all
    async fn ensure_available(&self) -> Result<()>;

    async fn upsert(&self, article: &NewArticle) -> std::result::Result<UpsertOutcome, PersistError>;
}

/// Gateway writing to the SQLite article store
pub struct SqliteGateway {
    db: Database,
    policy: DuplicatePolicy,
}

impl SqliteGateway {
    pub fn new(db: Database, policy: DuplicatePolicy) -> Self {
        Self { db, policy }
    }
}

#[async_trait]
impl ArticleGateway for SqliteGateway {
    async fn ensure_available(&self) -> Result<()> {
        self.db
            .ping()
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    async fn upsert(&self, article: &NewArticle) -> std::result::Result<UpsertOutcome, PersistError> {
        let repo = ArticleRepository::new(&self.db);
        let result = match self.policy {
            DuplicatePolicy::Skip => repo.insert_if_absent(article).await,
            DuplicatePolicy::Refresh => repo.insert_or_refresh(article).await,
        };

        result.map_err(|e| PersistError {
            link: article.link.clone(),
            message: e.to_string(),
        })
    }
}
