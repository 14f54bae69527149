mod article_repo;
mod database;
mod retry;

pub use article_repo::{
    ArticlePage, ArticleQuery, ArticleRepository, Pagination, UpsertOutcome, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use database::Database;
pub use retry::is_transient_error;
