use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::retry::query_with_retry;
use super::Database;
use crate::feed::{Article, NewArticle};
use crate::Result;

/// Default page size for article listings
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page size a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Result of writing one article keyed by its link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// First time this link was seen; a new row was created
    Inserted,
    /// The link was already stored and the row was left untouched
    Skipped,
    /// The link was already stored and its mutable fields were updated
    Refreshed,
}

/// Paginated listing request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Substring matched against title or description
    #[serde(default)]
    pub search: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl ArticleQuery {
    pub fn new(page: u32, limit: u32, search: Option<String>) -> Self {
        Self { page, limit, search }
    }

    fn page(&self) -> u32 {
        self.page.max(1)
    }

    fn limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        }
    }

    fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub pagination: Pagination,
}

/// Repository for article persistence and reads
pub struct ArticleRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    link: String,
    description: String,
    content: String,
    pub_date: DateTime<Utc>,
    author: String,
    source: String,
    image_url: String,
    created_at: DateTime<Utc>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            title: row.title,
            link: row.link,
            description: row.description,
            content: row.content,
            pub_date: row.pub_date,
            author: row.author,
            source: row.source,
            image_url: row.image_url,
            created_at: row.created_at,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, title, link, description, content, pub_date, author, source, image_url, created_at FROM articles";

impl<'a> ArticleRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert an article unless its link is already stored.
    ///
    /// The uniqueness constraint on `link` decides; a conflict on that constraint
    /// is reported as `Skipped`, every other failure as an error.
    pub async fn insert_if_absent(&self, article: &NewArticle) -> Result<UpsertOutcome> {
        let pool = self.db.pool();
        let now = Utc::now();

        let rows = query_with_retry(|| async move {
            sqlx::query(
                r#"
                INSERT INTO articles
                (title, link, description, content, pub_date, author, source, image_url, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(link) DO NOTHING
                "#,
            )
            .bind(&article.title)
            .bind(&article.link)
            .bind(&article.description)
            .bind(&article.content)
            .bind(article.pub_date)
            .bind(&article.author)
            .bind(&article.source)
            .bind(&article.image_url)
            .bind(now)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
        })
        .await?;

        if rows > 0 {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Skipped)
        }
    }

    /// Insert an article, or refresh the stored copy when the link already exists.
    ///
    /// Empty incoming fields never overwrite stored values; `link`, `id` and
    /// `created_at` are never modified.
    pub async fn insert_or_refresh(&self, article: &NewArticle) -> Result<UpsertOutcome> {
        if self.insert_if_absent(article).await? == UpsertOutcome::Inserted {
            return Ok(UpsertOutcome::Inserted);
        }

        let pool = self.db.pool();
        query_with_retry(|| async move {
            sqlx::query(
                r#"
                UPDATE articles
                SET title = ?,
                    description = CASE WHEN ? <> '' THEN ? ELSE description END,
                    content = CASE WHEN ? <> '' THEN ? ELSE content END,
                    author = CASE WHEN ? <> '' THEN ? ELSE author END,
                    image_url = CASE WHEN ? <> '' THEN ? ELSE image_url END,
                    pub_date = ?
                WHERE link = ?
                "#,
            )
            .bind(&article.title)
            .bind(&article.description)
            .bind(&article.description)
            .bind(&article.content)
            .bind(&article.content)
            .bind(&article.author)
            .bind(&article.author)
            .bind(&article.image_url)
            .bind(&article.image_url)
            .bind(article.pub_date)
            .bind(&article.link)
            .execute(pool)
            .await
            .map(|_| ())
        })
        .await?;

        Ok(UpsertOutcome::Refreshed)
    }

    /// Find an article by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Article>> {
        let row: Option<ArticleRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(Article::from))
    }

    /// Find an article by its origin URL
    pub async fn find_by_link(&self, link: &str) -> Result<Option<Article>> {
        let row: Option<ArticleRow> =
            sqlx::query_as(&format!("{} WHERE link = ?", SELECT_COLUMNS))
                .bind(link)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(Article::from))
    }

    /// Count all stored articles
    pub async fn count(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0.max(0) as u64)
    }

    /// List one page of articles, newest publication first
    pub async fn list_page(&self, query: &ArticleQuery) -> Result<ArticlePage> {
        let page = query.page();
        let limit = query.limit();
        let offset = (page as i64 - 1) * limit as i64;

        let (total, rows): ((i64,), Vec<ArticleRow>) = match query.search_pattern() {
            Some(pattern) => {
                let total = sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM articles
                    WHERE title LIKE ?1 ESCAPE '\' OR description LIKE ?1 ESCAPE '\'
                    "#,
                )
                .bind(&pattern)
                .fetch_one(self.db.pool())
                .await?;

                let rows = sqlx::query_as(&format!(
                    r#"{}
                    WHERE title LIKE ?1 ESCAPE '\' OR description LIKE ?1 ESCAPE '\'
                    ORDER BY pub_date DESC, id DESC
                    LIMIT ?2 OFFSET ?3"#,
                    SELECT_COLUMNS
                ))
                .bind(&pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.db.pool())
                .await?;

                (total, rows)
            }
            None => {
                let total = sqlx::query_as("SELECT COUNT(*) FROM articles")
                    .fetch_one(self.db.pool())
                    .await?;

                let rows = sqlx::query_as(&format!(
                    "{} ORDER BY pub_date DESC, id DESC LIMIT ? OFFSET ?",
                    SELECT_COLUMNS
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(self.db.pool())
                .await?;

                (total, rows)
            }
        };

        let total = total.0.max(0) as u64;
        let total_pages = total.div_ceil(limit as u64);

        Ok(ArticlePage {
            articles: rows.into_iter().map(Article::from).collect(),
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
            },
        })
    }
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn article(link: &str, title: &str, day: u32) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            link: link.to_string(),
            description: format!("About {}", title),
            content: String::new(),
            pub_date: Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0).unwrap(),
            author: String::new(),
            source: "Example".to_string(),
            image_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_link_is_skipped_and_row_unchanged() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = ArticleRepository::new(&db);

        let first = article("https://example.com/a", "Original", 1);
        assert_eq!(repo.insert_if_absent(&first).await.unwrap(), UpsertOutcome::Inserted);
        let stored = repo.find_by_link(&first.link).await.unwrap().unwrap();

        let mut second = article("https://example.com/a", "Changed", 2);
        second.content = "new body".to_string();
        assert_eq!(repo.insert_if_absent(&second).await.unwrap(), UpsertOutcome::Skipped);

        let after = repo.find_by_link(&first.link).await.unwrap().unwrap();
        assert_eq!(after, stored);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_identity_and_created_at() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = ArticleRepository::new(&db);

        let mut first = article("https://example.com/a", "Original", 1);
        first.author = "Jane".to_string();
        assert_eq!(repo.insert_or_refresh(&first).await.unwrap(), UpsertOutcome::Inserted);
        let stored = repo.find_by_link(&first.link).await.unwrap().unwrap();

        let update = article("https://example.com/a", "Corrected", 3);
        assert_eq!(repo.insert_or_refresh(&update).await.unwrap(), UpsertOutcome::Refreshed);

        let after = repo.find_by_link(&first.link).await.unwrap().unwrap();
        assert_eq!(after.id, stored.id);
        assert_eq!(after.created_at, stored.created_at);
        assert_eq!(after.title, "Corrected");
        assert_eq!(after.pub_date, update.pub_date);
        // empty incoming author does not wipe the stored one
        assert_eq!(after.author, "Jane");
    }

    #[tokio::test]
    async fn test_list_page_orders_and_paginates() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = ArticleRepository::new(&db);

        for day in 1..=5 {
            let a = article(&format!("https://example.com/{}", day), &format!("Story {}", day), day);
            repo.insert_if_absent(&a).await.unwrap();
        }

        let page = repo.list_page(&ArticleQuery::new(1, 2, None)).await.unwrap();
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
        let titles: Vec<_> = page.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Story 5", "Story 4"]);

        let last = repo.list_page(&ArticleQuery::new(3, 2, None)).await.unwrap();
        assert_eq!(last.articles.len(), 1);
        assert_eq!(last.articles[0].title, "Story 1");
    }

    #[tokio::test]
    async fn test_list_page_search_matches_title_or_description() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = ArticleRepository::new(&db);

        repo.insert_if_absent(&article("https://example.com/rust", "Rust 2.0", 1)).await.unwrap();
        let mut other = article("https://example.com/other", "Weather", 2);
        other.description = "Mentions rust on bridges".to_string();
        repo.insert_if_absent(&other).await.unwrap();
        repo.insert_if_absent(&article("https://example.com/none", "Sports", 3)).await.unwrap();

        let page = repo
            .list_page(&ArticleQuery::new(1, 20, Some("rust".to_string())))
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 2);

        let literal = repo
            .list_page(&ArticleQuery::new(1, 20, Some("100%".to_string())))
            .await
            .unwrap();
        assert_eq!(literal.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_query_bounds_are_normalised() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = ArticleRepository::new(&db);

        let page = repo.list_page(&ArticleQuery::new(0, 1000, None)).await.unwrap();
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.limit, MAX_PAGE_SIZE);
        assert_eq!(page.pagination.total_pages, 0);
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = ArticleRepository::new(&db);

        let before = Utc::now() - Duration::seconds(1);
        repo.insert_if_absent(&article("https://example.com/a", "A", 1)).await.unwrap();
        let stored = repo.find_by_link("https://example.com/a").await.unwrap().unwrap();

        let found = repo.find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(found.link, "https://example.com/a");
        assert!(found.created_at >= before);
        assert!(repo.find_by_id(stored.id + 100).await.unwrap().is_none());
    }
}
